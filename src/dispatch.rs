use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;

use crate::error::CrmError;
use crate::oauth::TokenCache;
use crate::types::FetchAttempt;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the shared HTTP client. Every call made through it is bounded by
/// `request_timeout`.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client, CrmError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
        .timeout(request_timeout)
        .user_agent(concat!("crmlookup/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| CrmError::config(format!("Cannot build HTTP client: {e}")))
}

/// One outbound API request, described independently of the token used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub method: Method,
    pub base_url: String,
    /// Path relative to `base_url`; may carry its own query string.
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl RequestSpec {
    pub fn get(base_url: &str, path: &str) -> Self {
        Self {
            method: Method::GET,
            base_url: base_url.to_string(),
            path: path.to_string(),
            query: Vec::new(),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn url(&self) -> Result<Url, CrmError> {
        let base = self.base_url.trim_end_matches('/');
        let raw = if self.path.starts_with('/') {
            format!("{base}{}", self.path)
        } else {
            format!("{base}/{}", self.path)
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| CrmError::config(format!("Invalid API URL '{raw}': {e}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }
}

/// An HTTP response from the provider, whatever its status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub url: String,
    /// Parsed JSON body; `None` when the body was empty or not JSON.
    pub payload: Option<Value>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED.as_u16() || self.status == StatusCode::FORBIDDEN.as_u16()
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND.as_u16()
    }

    /// Classify a non-2xx response.
    pub fn to_error(&self) -> CrmError {
        if self.is_auth_failure() {
            CrmError::Authorization {
                status: self.status,
                url: self.url.clone(),
            }
        } else {
            CrmError::Upstream {
                status: self.status,
                url: self.url.clone(),
                body: provider_message(self.payload.as_ref(), &self.body),
            }
        }
    }

    pub fn to_attempt(&self, spec: &RequestSpec) -> FetchAttempt {
        FetchAttempt {
            ok: self.is_success(),
            status: Some(self.status),
            url: self.url.clone(),
            base_url: spec.base_url.clone(),
            path: spec.path.clone(),
            payload: self.payload.clone(),
            message: if self.is_success() {
                None
            } else {
                provider_message(self.payload.as_ref(), &self.body)
            },
        }
    }
}

/// Best human-readable message in an error body.
fn provider_message(payload: Option<&Value>, body: &str) -> Option<String> {
    if let Some(p) = payload {
        for key in ["message", "error_description", "error", "msg"] {
            match p.get(key) {
                Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(Value::Array(items)) if !items.is_empty() => {
                    return Some(
                        items
                            .iter()
                            .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                            .collect::<Vec<_>>()
                            .join("; "),
                    )
                }
                _ => {}
            }
        }
    }
    let line = body.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        None
    } else {
        Some(line.chars().take(200).collect())
    }
}

/// Issues authorized requests, refreshing the token once on rejection.
pub struct Dispatcher {
    http: reqwest::Client,
    tokens: Arc<TokenCache>,
    api_version: String,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("api_version", &self.api_version)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(http: reqwest::Client, tokens: Arc<TokenCache>, api_version: &str) -> Self {
        Self {
            http,
            tokens,
            api_version: api_version.to_string(),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Send `spec` with the current token.
    ///
    /// On 401/403 the cached token is dropped, a new one acquired and the
    /// request sent once more; whatever that second attempt returns is final.
    /// Non-2xx responses are returned as `Ok` for the caller to classify.
    pub async fn dispatch(&self, spec: &RequestSpec) -> Result<ApiResponse, CrmError> {
        self.dispatch_into(spec, None).await
    }

    /// [`dispatch`](Self::dispatch), recording the outcome in `trail`.
    ///
    /// A request retried after a rejection is recorded once, with its final
    /// outcome. If no new token can be had after a rejection, the rejected
    /// response is recorded instead. Token failures before anything was sent
    /// are not recorded.
    pub async fn fetch(
        &self,
        spec: &RequestSpec,
        trail: &mut Vec<FetchAttempt>,
    ) -> Result<ApiResponse, CrmError> {
        self.dispatch_into(spec, Some(trail)).await
    }

    async fn dispatch_into(
        &self,
        spec: &RequestSpec,
        mut trail: Option<&mut Vec<FetchAttempt>>,
    ) -> Result<ApiResponse, CrmError> {
        let url = spec.url()?;
        let token = self.tokens.get().await?;
        let first = record(spec, self.send(spec, &url, &token).await, &mut trail, false)?;
        if !first.is_auth_failure() {
            return Ok(first);
        }

        tracing::warn!(status = first.status, url = %first.url, "token rejected; refreshing and retrying once");
        self.tokens.invalidate().await;
        let token = match self.tokens.get().await {
            Ok(token) => token,
            Err(e) => {
                if let Some(trail) = trail.as_deref_mut() {
                    trail.push(first.to_attempt(spec));
                }
                return Err(e);
            }
        };
        let retry = record(spec, self.send(spec, &url, &token).await, &mut trail, true)?;
        if retry.is_auth_failure() {
            tracing::warn!(status = retry.status, url = %retry.url, "token rejected again after refresh");
        }
        Ok(retry)
    }

    async fn send(&self, spec: &RequestSpec, url: &Url, token: &str) -> Result<ApiResponse, CrmError> {
        tracing::debug!(method = %spec.method, url = %url, "dispatching request");
        let response = self
            .http
            .request(spec.method.clone(), url.clone())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json")
            .header("Version", self.api_version.as_str())
            .send()
            .await
            .map_err(|e| network_error(url, &e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| network_error(url, &e))?;
        let payload = if body.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&body) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "response body is not JSON; treating as absent");
                    None
                }
            }
        };

        Ok(ApiResponse {
            status,
            url: url.to_string(),
            payload,
            body,
        })
    }
}

/// Push `result` onto `trail`. Network failures are always recorded; a
/// response only when it is final, i.e. not a rejection about to be retried.
fn record(
    spec: &RequestSpec,
    result: Result<ApiResponse, CrmError>,
    trail: &mut Option<&mut Vec<FetchAttempt>>,
    is_retry: bool,
) -> Result<ApiResponse, CrmError> {
    let Some(trail) = trail.as_deref_mut() else {
        return result;
    };
    match &result {
        Ok(resp) if is_retry || !resp.is_auth_failure() => trail.push(resp.to_attempt(spec)),
        Ok(_) => {}
        Err(err @ CrmError::Network { url, .. }) => trail.push(FetchAttempt {
            ok: false,
            status: None,
            url: url.clone(),
            base_url: spec.base_url.clone(),
            path: spec.path.clone(),
            payload: None,
            message: Some(err.to_string()),
        }),
        Err(_) => {}
    }
    result
}

fn network_error(url: &Url, err: &reqwest::Error) -> CrmError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    CrmError::Network {
        url: url.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, payload: Option<Value>, body: &str) -> ApiResponse {
        ApiResponse {
            status,
            url: "https://h.test/locations/x".into(),
            payload,
            body: body.into(),
        }
    }

    #[test]
    fn url_joins_base_path_and_query() {
        let spec = RequestSpec::get("https://h.test/", "/locations/search")
            .query("query", "main st")
            .query("limit", "20");
        assert_eq!(
            spec.url().unwrap().as_str(),
            "https://h.test/locations/search?query=main+st&limit=20"
        );
    }

    #[test]
    fn url_keeps_inline_query_and_adds_missing_slash() {
        let spec = RequestSpec::get("https://h.test", "custom-values?locationId=abc");
        assert_eq!(
            spec.url().unwrap().as_str(),
            "https://h.test/custom-values?locationId=abc"
        );
    }

    #[test]
    fn invalid_base_is_config_error() {
        let err = RequestSpec::get("not a url", "/x").url().unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn classify_statuses() {
        assert!(response(204, None, "").is_success());
        assert!(response(401, None, "").is_auth_failure());
        assert!(response(403, None, "").is_auth_failure());
        assert!(response(404, None, "").is_not_found());
        assert!(matches!(
            response(403, None, "").to_error(),
            CrmError::Authorization { status: 403, .. }
        ));
        assert!(matches!(
            response(500, None, "").to_error(),
            CrmError::Upstream { status: 500, .. }
        ));
    }

    #[test]
    fn upstream_error_prefers_provider_message() {
        let resp = response(422, Some(json!({ "message": ["limit must be <= 100"] })), "");
        match resp.to_error() {
            CrmError::Upstream { body, .. } => {
                assert_eq!(body.as_deref(), Some("limit must be <= 100"))
            }
            other => panic!("unexpected: {other}"),
        }

        let resp = response(502, None, "<html>Bad Gateway</html>\n<body/>");
        match resp.to_error() {
            CrmError::Upstream { body, .. } => {
                assert_eq!(body.as_deref(), Some("<html>Bad Gateway</html>"))
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn attempt_mirrors_response() {
        let spec = RequestSpec::get("https://h.test", "/locations/x");
        let ok = response(200, Some(json!({ "location": {} })), "{}").to_attempt(&spec);
        assert!(ok.ok);
        assert_eq!(ok.status, Some(200));
        assert_eq!(ok.base_url, "https://h.test");
        assert!(ok.message.is_none());

        let missing = response(404, Some(json!({ "message": "Not found" })), "").to_attempt(&spec);
        assert!(!missing.ok);
        assert_eq!(missing.message.as_deref(), Some("Not found"));
    }
}
