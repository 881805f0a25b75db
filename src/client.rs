use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{load_config, CrmConfig};
use crate::dispatch::{build_http_client, ApiResponse, Dispatcher, RequestSpec};
use crate::error::{CrmError, LookupError};
use crate::oauth::{ExpiryPolicy, OAuthAcquirer, TokenCache};
use crate::probe::{encode_segment, EndpointProber};
use crate::types::{
    normalize_custom_values, normalize_location, normalize_locations, CustomValue, FetchAttempt,
    LocationDetail, LocationSummary, Lookup,
};

pub const DEFAULT_SEARCH_LIMIT: u32 = 20;
pub const MAX_SEARCH_LIMIT: u32 = 100;

/// What the `token` command reports after acquiring a token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenStatus {
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: i64,
    /// Number of acquisitions this client made, normally 1.
    pub acquisitions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Caller-facing lookups against the CRM API.
///
/// Owns the one token cache for its lifetime; clone the `Arc` around it
/// rather than building a second client.
#[derive(Debug)]
pub struct CrmClient {
    config: CrmConfig,
    acquirer: Arc<OAuthAcquirer>,
    dispatcher: Arc<Dispatcher>,
    prober: EndpointProber,
}

impl CrmClient {
    /// Build a client from the layered config files and environment.
    pub fn from_env(cli_config: Option<&str>) -> Result<Self, CrmError> {
        let config = load_config(cli_config)?;
        Self::from_config(config)
    }

    pub fn from_config(config: CrmConfig) -> Result<Self, CrmError> {
        let http = build_http_client(config.request_timeout)?;
        Ok(Self::with_http(config, http))
    }

    /// Build a client over an existing HTTP client.
    pub fn with_http(config: CrmConfig, http: reqwest::Client) -> Self {
        let acquirer = Arc::new(OAuthAcquirer::from_config(http.clone(), &config));
        let tokens = Arc::new(TokenCache::new(
            acquirer.clone(),
            ExpiryPolicy::with_buffer(config.expiry_buffer_secs),
        ));
        let dispatcher = Arc::new(Dispatcher::new(http, tokens, &config.api_version));
        let prober = EndpointProber::new(dispatcher.clone(), config.canonical_hosts.clone());
        Self {
            config,
            acquirer,
            dispatcher,
            prober,
        }
    }

    pub fn config(&self) -> &CrmConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        self.dispatcher.tokens()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Search locations visible to the configured credentials.
    pub async fn list_locations(
        &self,
        query: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Lookup<Vec<LocationSummary>>, LookupError> {
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let mut spec = RequestSpec::get(&self.config.api_base_url, "/locations/search");
        if let Some(q) = query.filter(|q| !q.trim().is_empty()) {
            spec = spec.query("query", q.trim());
        }
        spec = spec.query("limit", limit.to_string());
        if let Some(company) = &self.config.company_id {
            spec = spec.query("companyId", company.as_str());
        }

        let (resp, attempts) = self.fetch_ok(&spec).await?;
        match normalize_locations(resp.payload.as_ref()) {
            Ok(data) => Ok(Lookup { data, attempts }),
            Err(e) => Err(LookupError::new(e, attempts)),
        }
    }

    /// Fetch one location. `data` is `None` when the provider answered with
    /// an empty body.
    pub async fn location(&self, id: &str) -> Result<Lookup<Option<LocationDetail>>, LookupError> {
        let path = format!("/locations/{}", encode_segment(id));
        let spec = RequestSpec::get(&self.config.api_base_url, &path);

        let (resp, attempts) = self.fetch_ok(&spec).await?;
        match normalize_location(resp.payload.as_ref()) {
            Ok(data) => Ok(Lookup { data, attempts }),
            Err(e) => Err(LookupError::new(e, attempts)),
        }
    }

    /// Custom values for a location, probing the known endpoint shapes.
    /// An empty `data` with a full trail means no endpoint had them.
    pub async fn custom_values(&self, id: &str) -> Result<Lookup<Vec<CustomValue>>, LookupError> {
        let outcome = self.prober.probe(&self.config.api_base_url, id).await?;
        let payload = outcome.response.as_ref().and_then(|r| r.payload.as_ref());
        match normalize_custom_values(payload) {
            Ok(data) => Ok(Lookup {
                data,
                attempts: outcome.attempts,
            }),
            Err(e) => Err(LookupError::new(e, outcome.attempts)),
        }
    }

    /// Make sure a valid access token is cached and report on it.
    pub async fn token_status(&self, include_refresh: bool) -> Result<TokenStatus, CrmError> {
        self.tokens().get().await?;
        let token = self
            .tokens()
            .snapshot()
            .await
            .ok_or_else(|| CrmError::Acquisition("token was evicted right after acquisition".into()))?;
        Ok(TokenStatus {
            expires_at: token.expires_at,
            expires_in_secs: (token.expires_at - Utc::now()).num_seconds().max(0),
            acquisitions: self.tokens().acquisitions(),
            refresh_token: if include_refresh {
                self.acquirer.current_refresh_token()
            } else {
                None
            },
        })
    }

    async fn fetch_ok(
        &self,
        spec: &RequestSpec,
    ) -> Result<(ApiResponse, Vec<FetchAttempt>), LookupError> {
        let mut attempts = Vec::new();
        let resp = match self.dispatcher.fetch(spec, &mut attempts).await {
            Ok(resp) => resp,
            Err(e) => return Err(LookupError::new(e, attempts)),
        };
        if !resp.is_success() {
            return Err(LookupError::new(resp.to_error(), attempts));
        }
        Ok((resp, attempts))
    }
}
