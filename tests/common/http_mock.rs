use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub fn token_url(server: &MockServer) -> String {
    format!("{}/oauth/token", server.uri())
}

/// A successful token endpoint response.
#[allow(dead_code)]
pub fn token_response(access_token: &str, refresh_token: Option<&str>) -> ResponseTemplate {
    let mut body = serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = serde_json::Value::String(rt.to_string());
    }
    ResponseTemplate::new(200).set_body_json(body)
}

/// Answer every token request with `access_token`.
#[allow(dead_code)]
pub async fn mount_token(server: &MockServer, access_token: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(token_response(access_token, Some("rt-next")))
        .mount(server)
        .await;
}

/// Answer token requests with each of `tokens` once, in order; the last one
/// keeps being served after that.
#[allow(dead_code)]
pub async fn mount_token_sequence(server: &MockServer, tokens: &[&str]) {
    let Some((last, first)) = tokens.split_last() else {
        return;
    };
    for token in first {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(token_response(token, Some("rt-next")))
            .up_to_n_times(1)
            .mount(server)
            .await;
    }
    mount_token(server, last).await;
}
