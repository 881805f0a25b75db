use std::path::PathBuf;

use crate::types::FetchAttempt;

/// Every failure the lookup core can surface.
///
/// `Clone` so a single token acquisition can hand the same outcome to every
/// caller queued behind it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CrmError {
    #[error("Error in config {}: {detail}", path.display())]
    Config { path: PathBuf, detail: String },

    #[error("Token acquisition failed: {0}")]
    Acquisition(String),

    #[error("Provider rejected credentials with HTTP {status} for {url}")]
    Authorization { status: u16, url: String },

    #[error("Cannot reach {url}: {message}")]
    Network { url: String, message: String },

    #[error("{}", format_upstream(.status, .url, .body))]
    Upstream {
        status: u16,
        url: String,
        body: Option<String>,
    },

    #[error("Unexpected response shape: {0}")]
    Normalization(String),
}

fn format_upstream(status: &u16, url: &str, body: &Option<String>) -> String {
    match body.as_deref() {
        Some(b) if !b.is_empty() => format!("HTTP {status} from {url}: {b}"),
        _ => format!("HTTP {status} from {url}"),
    }
}

impl CrmError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            CrmError::Config { .. } => "config_error",
            CrmError::Acquisition(_) => "acquisition_failed",
            CrmError::Authorization { .. } => "unauthorized",
            CrmError::Network { .. } => "network_error",
            CrmError::Upstream { .. } => "upstream_error",
            CrmError::Normalization(_) => "normalization_error",
        }
    }

    /// HTTP status attached to this error, if the provider answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            CrmError::Authorization { status, .. } => Some(*status),
            CrmError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            CrmError::Authorization { url, .. } => Some(url),
            CrmError::Network { url, .. } => Some(url),
            CrmError::Upstream { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Produce a structured JSON error object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(status) = self.status() {
            obj.insert("status".into(), serde_json::Value::from(status));
        }
        if let Some(url) = self.url() {
            obj.insert("url".into(), serde_json::Value::String(url.to_string()));
        }
        obj.insert("message".into(), serde_json::Value::String(self.to_string()));
        obj.insert("code".into(), serde_json::Value::String(self.code().to_string()));
        serde_json::json!({ "error": obj })
    }

    pub(crate) fn config(detail: impl Into<String>) -> Self {
        CrmError::Config {
            path: PathBuf::from("<env>"),
            detail: detail.into(),
        }
    }
}

/// A failed caller-facing lookup together with every URL tried before it
/// failed, so "nothing exists" can be told apart from "something is broken".
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct LookupError {
    #[source]
    pub error: CrmError,
    pub attempts: Vec<FetchAttempt>,
}

impl LookupError {
    pub fn new(error: CrmError, attempts: Vec<FetchAttempt>) -> Self {
        Self { error, attempts }
    }

    pub fn code(&self) -> &'static str {
        self.error.code()
    }

    /// The error object plus the diagnostic trail.
    pub fn to_json(&self) -> serde_json::Value {
        let mut json = self.error.to_json();
        json["attempts"] = serde_json::to_value(&self.attempts).unwrap_or_default();
        json
    }
}

impl From<CrmError> for LookupError {
    fn from(error: CrmError) -> Self {
        Self {
            error,
            attempts: Vec::new(),
        }
    }
}
