use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
/// Shortest lifetime a freshly issued token is ever given.
pub const MIN_TOKEN_LIFETIME_SECS: i64 = 30;
/// Longest lifetime accepted from a provider (ten years).
pub const MAX_TOKEN_LIFETIME_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// A successful token endpoint response.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl TokenGrant {
    /// Read a token endpoint JSON body. `expires_in` may be a number or a
    /// numeric string; anything else is treated as absent.
    pub fn from_json(body: &serde_json::Value) -> Result<Self, String> {
        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "response did not include an access_token".to_string())?;
        let refresh_token = body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let expires_in = body.get("expires_in").and_then(parse_seconds);
        Ok(Self {
            access_token: access_token.to_string(),
            refresh_token,
            expires_in,
        })
    }
}

fn parse_seconds(value: &serde_json::Value) -> Option<i64> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }?;
    Some(secs.clamp(0, MAX_TOKEN_LIFETIME_SECS))
}

/// How long an issued token is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub buffer_secs: i64,
    pub floor_secs: i64,
    pub default_lifetime_secs: i64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            buffer_secs: crate::config::types::DEFAULT_EXPIRY_BUFFER_SECS,
            floor_secs: MIN_TOKEN_LIFETIME_SECS,
            default_lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
        }
    }
}

impl ExpiryPolicy {
    pub fn with_buffer(buffer_secs: i64) -> Self {
        Self {
            buffer_secs,
            ..Self::default()
        }
    }

    /// Seconds a token with the given provider lifetime is served from cache.
    pub fn effective_lifetime(&self, expires_in: Option<i64>) -> i64 {
        let lifetime = expires_in
            .unwrap_or(self.default_lifetime_secs)
            .min(MAX_TOKEN_LIFETIME_SECS);
        lifetime
            .saturating_sub(self.buffer_secs)
            .max(self.floor_secs.max(1))
    }
}

/// The single live access token held by the token cache.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl CachedToken {
    pub fn issue(grant: TokenGrant, policy: &ExpiryPolicy, issued_at: DateTime<Utc>) -> Self {
        let lifetime = policy.effective_lifetime(grant.expires_in);
        let floor = policy.floor_secs.clamp(1, MAX_TOKEN_LIFETIME_SECS);
        let expires_at = [lifetime, floor]
            .into_iter()
            .filter_map(TimeDelta::try_seconds)
            .find_map(|delta| issued_at.checked_add_signed(delta))
            .unwrap_or(issued_at);
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at,
        }
    }

    /// Valid strictly before `expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }
}
