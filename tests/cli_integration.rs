use assert_cmd::Command;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::http_mock::{mount_token, token_response, token_url};

/// The binary with a scrubbed environment, running in `home` so no real
/// config or env file is picked up.
fn crmlookup_cmd(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("crmlookup").unwrap();
    cmd.env_clear().env("HOME", home).current_dir(home);
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("crmlookup")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("locations"))
        .stdout(predicate::str::contains("custom-values"))
        .stdout(predicate::str::contains("token"));
}

#[test]
fn missing_subcommand_is_usage_error() {
    let home = tempfile::tempdir().unwrap();
    crmlookup_cmd(home.path()).assert().failure().code(2);
}

#[test]
fn non_numeric_limit_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    crmlookup_cmd(home.path())
        .args(["locations", "--limit", "lots"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--limit"));
}

#[test]
fn missing_credentials_fail_with_config_error() {
    let home = tempfile::tempdir().unwrap();
    crmlookup_cmd(home.path())
        .args(["location", "loc1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("CRM_CLIENT_ID"));
}

#[test]
fn json_mode_prints_error_object_on_stdout() {
    let home = tempfile::tempdir().unwrap();
    crmlookup_cmd(home.path())
        .args(["--json", "custom-values", "loc1"])
        .env("CRM_CLIENT_ID", "cid")
        .env("CRM_CLIENT_SECRET", "secret")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("\"config_error\""))
        .stdout(predicate::str::contains("CRM_REFRESH_TOKEN"));
}

#[test]
fn missing_explicit_config_file_is_an_error() {
    let home = tempfile::tempdir().unwrap();
    crmlookup_cmd(home.path())
        .args(["--config", "nope.json", "token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_values_json_end_to_end() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/locations/loc1/customValues"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "customValues": [{ "id": "cv1", "name": "Brand", "value": "Acme" }]
        })))
        .mount(&server)
        .await;

    let token_endpoint = token_url(&server);
    let api = server.uri();
    let home = tempfile::tempdir().unwrap();
    let home_path = home.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        crmlookup_cmd(&home_path)
            .args(["--json", "custom-values", "loc1"])
            .env("CRM_CLIENT_ID", "cid")
            .env("CRM_CLIENT_SECRET", "secret")
            .env("CRM_REFRESH_TOKEN", "rt-0")
            .env("CRM_TOKEN_URL", token_endpoint)
            .env("CRM_API_BASE_URL", api)
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["data"][0]["name"], "Brand");
    assert_eq!(json["data"][0]["value"], "Acme");
    assert_eq!(json["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(json["attempts"][0]["status"], 200);
}

#[tokio::test(flavor = "multi_thread")]
async fn token_command_reads_config_file_and_shows_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response("tok-1", Some("rt-rotated")))
        .expect(1)
        .mount(&server)
        .await;

    let config = serde_json::json!({
        "clientId": "cid",
        "clientSecret": "secret",
        "refreshToken": "${SEED_REFRESH_TOKEN}",
        "tokenEndpoint": token_url(&server),
        "apiBaseUrl": server.uri(),
    });
    let home = common::temp_dir_with("crmlookup.jsonc", &format!("// local\n{config}"));
    let home_path = home.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        crmlookup_cmd(&home_path)
            .args(["token", "--json", "--show-refresh", "--config", "crmlookup.jsonc"])
            .env("SEED_REFRESH_TOKEN", "rt-0")
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["refreshToken"], "rt-rotated");
    assert_eq!(json["acquisitions"], 1);
    assert!(json["expiresAt"].is_string());
}

#[tokio::test(flavor = "multi_thread")]
async fn env_file_in_working_directory_supplies_credentials() {
    let server = MockServer::start().await;
    mount_token(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/locations/loc1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "location": { "id": "loc1", "name": "Main Street", "city": "Austin" }
        })))
        .mount(&server)
        .await;

    let env_file = format!(
        "# dev credentials\nCRM_CLIENT_ID=cid\nCRM_CLIENT_SECRET=\"secret\"\nexport CRM_REFRESH_TOKEN=rt-0\nCRM_TOKEN_URL={}\nCRM_API_BASE_URL={}\n",
        token_url(&server),
        server.uri()
    );
    let home = common::temp_dir_with(".env", &env_file);
    let home_path = home.path().to_path_buf();

    let output = tokio::task::spawn_blocking(move || {
        crmlookup_cmd(&home_path)
            .args(["location", "loc1"])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Main Street [loc1]"));
    assert!(stdout.contains("City: Austin"));
}
