use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::CrmError;

use super::acquirer::TokenSource;
use super::flight::SingleFlight;
use super::token::{CachedToken, ExpiryPolicy};

/// Process-wide holder of the single live access token.
///
/// Built once by the client and shared by reference; concurrent misses are
/// collapsed into one acquisition through [`SingleFlight`].
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    policy: ExpiryPolicy,
    slot: RwLock<Option<CachedToken>>,
    flight: SingleFlight<Result<CachedToken, CrmError>>,
    acquired: AtomicU64,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("policy", &self.policy)
            .field("acquisitions", &self.acquisitions())
            .finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(source: Arc<dyn TokenSource>, policy: ExpiryPolicy) -> Self {
        Self {
            source,
            policy,
            slot: RwLock::new(None),
            flight: SingleFlight::new(),
            acquired: AtomicU64::new(0),
        }
    }

    /// Return a valid access token, acquiring one if the cache is empty or
    /// the cached token has reached its expiry.
    pub async fn get(&self) -> Result<String, CrmError> {
        if let Some(token) = self.valid().await {
            tracing::debug!("serving cached access token");
            return Ok(token.access_token);
        }

        self.flight
            .run(|| self.refill())
            .await
            .map(|token| token.access_token)
    }

    async fn refill(&self) -> Result<CachedToken, CrmError> {
        // A flight that landed between our miss and taking the slot may
        // already have refilled the cache.
        if let Some(token) = self.valid().await {
            return Ok(token);
        }
        self.acquired.fetch_add(1, Ordering::Relaxed);
        let grant = self.source.acquire().await?;
        let token = CachedToken::issue(grant, &self.policy, Utc::now());
        tracing::debug!(expires_at = %token.expires_at, "cached new access token");
        *self.slot.write().await = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token unconditionally.
    pub async fn invalidate(&self) {
        if self.slot.write().await.take().is_some() {
            tracing::debug!("invalidated cached access token");
        }
    }

    /// Clone of the live token, valid or not.
    pub async fn snapshot(&self) -> Option<CachedToken> {
        self.slot.read().await.clone()
    }

    /// Number of times this cache has asked its source for a token.
    pub fn acquisitions(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    async fn valid(&self) -> Option<CachedToken> {
        let now = Utc::now();
        self.slot
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_valid_at(now))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::token::TokenGrant;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Hands out `tok-1`, `tok-2`, ... and counts calls.
    struct CountingSource {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
                fail: true,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn acquire(&self) -> Result<TokenGrant, CrmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(CrmError::Acquisition("refresh_token grant: HTTP 400".into()));
            }
            Ok(TokenGrant {
                access_token: format!("tok-{n}"),
                refresh_token: Some(format!("rt-{n}")),
                expires_in: Some(3600),
            })
        }
    }

    fn cache_over(source: Arc<CountingSource>) -> TokenCache {
        TokenCache::new(source, ExpiryPolicy::default())
    }

    #[tokio::test]
    async fn fresh_token_is_served_without_acquiring() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache_over(source.clone());
        *cache.slot.write().await = Some(CachedToken {
            access_token: "seeded".into(),
            refresh_token: None,
            expires_at: Utc::now() + chrono::Duration::minutes(10),
        });

        assert_eq!(cache.get().await.unwrap(), "seeded");
        assert_eq!(cache.get().await.unwrap(), "seeded");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn expired_token_triggers_exactly_one_acquisition() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache_over(source.clone());
        *cache.slot.write().await = Some(CachedToken {
            access_token: "stale".into(),
            refresh_token: None,
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        });

        assert_eq!(cache.get().await.unwrap(), "tok-1");
        assert_eq!(cache.get().await.unwrap(), "tok-1");
        assert_eq!(source.calls(), 1);
        let snap = cache.snapshot().await.unwrap();
        assert_eq!(snap.access_token, "tok-1");
        assert!(!snap.is_expired());
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_acquisition() {
        let source = CountingSource::new(Duration::from_millis(100));
        let cache = Arc::new(cache_over(source.clone()));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get().await }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().unwrap(), "tok-1");
        }
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.acquisitions(), 1);
    }

    #[tokio::test]
    async fn concurrent_waiters_share_a_failure() {
        let source = CountingSource::failing();
        let cache = Arc::new(cache_over(source.clone()));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get().await }));
        }
        for h in handles {
            let err = h.await.unwrap().unwrap_err();
            assert!(matches!(err, CrmError::Acquisition(_)));
        }
        assert_eq!(source.calls(), 1);
        assert!(cache.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn invalidate_forces_reacquisition() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache_over(source.clone());

        assert_eq!(cache.get().await.unwrap(), "tok-1");
        cache.invalidate().await;
        assert!(cache.snapshot().await.is_none());
        assert_eq!(cache.get().await.unwrap(), "tok-2");
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn acquisition_replaces_rather_than_merges() {
        let source = CountingSource::new(Duration::ZERO);
        let cache = cache_over(source.clone());
        *cache.slot.write().await = Some(CachedToken {
            access_token: "old".into(),
            refresh_token: Some("old-rt".into()),
            expires_at: Utc::now() - chrono::Duration::seconds(5),
        });

        cache.get().await.unwrap();
        let snap = cache.snapshot().await.unwrap();
        assert_eq!(snap.access_token, "tok-1");
        assert_eq!(snap.refresh_token.as_deref(), Some("rt-1"));
    }
}
