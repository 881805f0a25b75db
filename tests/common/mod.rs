pub mod http_mock;

use std::time::Duration;

use crmlookup::CrmConfig;

/// A config that talks only to mock servers: tokens from `token_url`, API
/// calls to `primary`, with `primary` and `legacy` as the canonical pair.
#[allow(dead_code)]
pub fn test_config(token_url: &str, primary: &str, legacy: &str) -> CrmConfig {
    let mut config = CrmConfig::new("cid", "client-secret");
    config.refresh_token = Some("rt-0".into());
    config.token_endpoint = token_url.to_string();
    config.api_base_url = primary.to_string();
    config.canonical_hosts = [primary.to_string(), legacy.to_string()];
    config.request_timeout = Duration::from_secs(5);
    config
}

/// Write `content` to `name` inside a fresh temp directory.
#[allow(dead_code)]
pub fn temp_dir_with(name: &str, content: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(name), content).unwrap();
    dir
}
