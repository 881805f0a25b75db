pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod oauth;
pub mod probe;
pub mod types;

pub use client::{CrmClient, TokenStatus};
pub use config::{load_config, CrmConfig};
pub use dispatch::{ApiResponse, Dispatcher, RequestSpec};
pub use error::{CrmError, LookupError};
pub use oauth::{OAuthAcquirer, TokenCache, TokenSource};
pub use probe::EndpointProber;
pub use types::{CustomValue, FetchAttempt, LocationDetail, LocationSummary, Lookup};

/// One-shot convenience function: load config, fetch a location's custom
/// values, drop the client.
pub async fn custom_values_once(location_id: &str) -> Result<Lookup<Vec<CustomValue>>, LookupError> {
    let client = CrmClient::from_env(None)?;
    client.custom_values(location_id).await
}
