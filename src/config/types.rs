use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://services.leadconnectorhq.com/oauth/token";
pub const PRIMARY_API_HOST: &str = "https://services.leadconnectorhq.com";
pub const LEGACY_API_HOST: &str = "https://rest.gohighlevel.com";
pub const DEFAULT_API_VERSION: &str = "2021-07-28";
pub const DEFAULT_USER_TYPE: &str = "Location";
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// One config file as written on disk. Every field is optional so files can
/// be layered; see [`ConfigFile::fill_from`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub authorization_code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub expiry_buffer_secs: Option<i64>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub canonical_hosts: Option<Vec<String>>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Fill every unset field from `other`. Fields already set here win.
    pub fn fill_from(&mut self, other: ConfigFile) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.client_id, other.client_id);
        fill(&mut self.client_secret, other.client_secret);
        fill(&mut self.refresh_token, other.refresh_token);
        fill(&mut self.authorization_code, other.authorization_code);
        fill(&mut self.redirect_uri, other.redirect_uri);
        fill(&mut self.user_type, other.user_type);
        fill(&mut self.token_endpoint, other.token_endpoint);
        fill(&mut self.expiry_buffer_secs, other.expiry_buffer_secs);
        fill(&mut self.api_base_url, other.api_base_url);
        fill(&mut self.canonical_hosts, other.canonical_hosts);
        fill(&mut self.api_version, other.api_version);
        fill(&mut self.company_id, other.company_id);
        fill(&mut self.request_timeout_secs, other.request_timeout_secs);
    }
}

/// Fully resolved configuration, after layering and validation.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: Option<String>,
    pub authorization_code: Option<String>,
    pub redirect_uri: Option<String>,
    pub user_type: String,
    pub token_endpoint: String,
    pub expiry_buffer_secs: i64,
    pub api_base_url: String,
    /// The two hosts the provider is known to serve from. The prober falls
    /// back from one to the other.
    pub canonical_hosts: [String; 2],
    pub api_version: String,
    pub company_id: Option<String>,
    pub request_timeout: Duration,
}

impl CrmConfig {
    /// Minimal config with every optional setting at its default.
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: None,
            authorization_code: None,
            redirect_uri: None,
            user_type: DEFAULT_USER_TYPE.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
            api_base_url: PRIMARY_API_HOST.to_string(),
            canonical_hosts: [PRIMARY_API_HOST.to_string(), LEGACY_API_HOST.to_string()],
            api_version: DEFAULT_API_VERSION.to_string(),
            company_id: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}
