use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::CrmConfig;
use crate::error::CrmError;

use super::token::TokenGrant;

/// Something that can mint a fresh access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn acquire(&self) -> Result<TokenGrant, CrmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    RefreshToken,
    AuthorizationCode,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::RefreshToken => "refresh_token",
            GrantKind::AuthorizationCode => "authorization_code",
        }
    }
}

/// One failed grant, kept only long enough to build the final error.
#[derive(Debug, Clone)]
pub struct AcquisitionAttempt {
    pub grant: GrantKind,
    pub error: String,
}

impl std::fmt::Display for AcquisitionAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} grant: {}", self.grant.as_str(), self.error)
    }
}

/// Client credentials and the grants available for the token endpoint.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_type: String,
    pub token_endpoint: String,
    pub redirect_uri: Option<String>,
    pub authorization_code: Option<String>,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("user_type", &self.user_type)
            .field("token_endpoint", &self.token_endpoint)
            .field("has_authorization_code", &self.authorization_code.is_some())
            .finish_non_exhaustive()
    }
}

/// Exchanges a refresh token or authorization code at the provider's token
/// endpoint.
///
/// The last refresh token the provider handed out is remembered here, not in
/// the token cache, so it outlives cache invalidation.
#[derive(Debug)]
pub struct OAuthAcquirer {
    http: reqwest::Client,
    credentials: OAuthCredentials,
    refresh_token: Mutex<Option<String>>,
}

impl OAuthAcquirer {
    pub fn new(
        http: reqwest::Client,
        credentials: OAuthCredentials,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            http,
            credentials,
            refresh_token: Mutex::new(refresh_token),
        }
    }

    pub fn from_config(http: reqwest::Client, config: &CrmConfig) -> Self {
        let credentials = OAuthCredentials {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            user_type: config.user_type.clone(),
            token_endpoint: config.token_endpoint.clone(),
            redirect_uri: config.redirect_uri.clone(),
            authorization_code: config.authorization_code.clone(),
        };
        Self::new(http, credentials, config.refresh_token.clone())
    }

    /// The refresh token the next acquisition will try first.
    pub fn current_refresh_token(&self) -> Option<String> {
        match self.refresh_token.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_refresh_token(&self, value: Option<String>) {
        match self.refresh_token.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    async fn exchange(&self, grant: GrantKind, secret: &str) -> Result<TokenGrant, String> {
        let creds = &self.credentials;
        let mut form: Vec<(&str, &str)> = vec![
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
            ("user_type", creds.user_type.as_str()),
            ("grant_type", grant.as_str()),
        ];
        match grant {
            GrantKind::RefreshToken => form.push(("refresh_token", secret)),
            GrantKind::AuthorizationCode => {
                form.push(("code", secret));
                if let Some(redirect_uri) = creds.redirect_uri.as_deref() {
                    form.push(("redirect_uri", redirect_uri));
                }
            }
        }

        let resp = self
            .http
            .post(&creds.token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {e}", creds.token_endpoint))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status.as_u16(), summarize(&body)));
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| format!("unparseable token response: {e}"))?;
        TokenGrant::from_json(&json)
    }
}

#[async_trait]
impl TokenSource for OAuthAcquirer {
    async fn acquire(&self) -> Result<TokenGrant, CrmError> {
        let refresh = self.current_refresh_token();
        let code = self.credentials.authorization_code.clone();
        if refresh.is_none() && code.is_none() {
            return Err(CrmError::config(
                "No refresh token or authorization code available to request an access token",
            ));
        }

        let mut failures: Vec<AcquisitionAttempt> = Vec::new();

        if let Some(rt) = refresh {
            match self.exchange(GrantKind::RefreshToken, &rt).await {
                Ok(grant) => return Ok(self.remember(grant)),
                Err(error) => {
                    tracing::warn!(%error, "refresh_token grant failed; discarding stored refresh token");
                    self.set_refresh_token(None);
                    failures.push(AcquisitionAttempt {
                        grant: GrantKind::RefreshToken,
                        error,
                    });
                }
            }
        }

        if let Some(code) = code {
            match self.exchange(GrantKind::AuthorizationCode, &code).await {
                Ok(grant) => return Ok(self.remember(grant)),
                Err(error) => {
                    tracing::warn!(%error, "authorization_code grant failed");
                    failures.push(AcquisitionAttempt {
                        grant: GrantKind::AuthorizationCode,
                        error,
                    });
                }
            }
        }

        Err(CrmError::Acquisition(
            failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        ))
    }
}

impl OAuthAcquirer {
    fn remember(&self, grant: TokenGrant) -> TokenGrant {
        if let Some(rt) = &grant.refresh_token {
            self.set_refresh_token(Some(rt.clone()));
        }
        tracing::info!(expires_in = ?grant.expires_in, "acquired access token");
        grant
    }
}

/// First line of an error body, capped so provider HTML pages stay readable.
fn summarize(body: &str) -> String {
    const MAX: usize = 300;
    let line = body.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "<empty body>".to_string();
    }
    match line.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(code: Option<&str>) -> OAuthCredentials {
        OAuthCredentials {
            client_id: "cid".into(),
            client_secret: "shh-client-secret".into(),
            user_type: "Location".into(),
            token_endpoint: "http://127.0.0.1:9/oauth/token".into(),
            redirect_uri: None,
            authorization_code: code.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn fails_fast_without_any_grant() {
        let acquirer = OAuthAcquirer::new(reqwest::Client::new(), credentials(None), None);
        let err = acquirer.acquire().await.unwrap_err();
        assert!(matches!(err, CrmError::Config { .. }));
    }

    #[test]
    fn attempt_display_names_grant() {
        let attempt = AcquisitionAttempt {
            grant: GrantKind::AuthorizationCode,
            error: "HTTP 400: invalid_grant".into(),
        };
        assert_eq!(
            attempt.to_string(),
            "authorization_code grant: HTTP 400: invalid_grant"
        );
    }

    #[test]
    fn summarize_trims_and_caps() {
        assert_eq!(summarize(""), "<empty body>");
        assert_eq!(summarize("{\"error\":\"invalid_grant\"}\nmore"), "{\"error\":\"invalid_grant\"}");
        let long = "x".repeat(500);
        assert_eq!(summarize(&long).chars().count(), 301);
    }

    #[test]
    fn refresh_token_slot_is_seeded_and_replaceable() {
        let acquirer =
            OAuthAcquirer::new(reqwest::Client::new(), credentials(None), Some("rt-1".into()));
        assert_eq!(acquirer.current_refresh_token().as_deref(), Some("rt-1"));
        let grant = acquirer.remember(TokenGrant {
            access_token: "at".into(),
            refresh_token: Some("rt-2".into()),
            expires_in: None,
        });
        assert_eq!(grant.access_token, "at");
        assert_eq!(acquirer.current_refresh_token().as_deref(), Some("rt-2"));
    }

    #[test]
    fn debug_hides_client_secret() {
        let out = format!("{:?}", credentials(Some("code-123")));
        assert!(!out.contains("shh-client-secret"));
        assert!(!out.contains("code-123"));
    }
}
