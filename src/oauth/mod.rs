pub mod acquirer;
pub mod cache;
pub mod flight;
pub mod token;

pub use acquirer::{AcquisitionAttempt, GrantKind, OAuthAcquirer, OAuthCredentials, TokenSource};
pub use cache::TokenCache;
pub use flight::SingleFlight;
pub use token::{CachedToken, ExpiryPolicy, TokenGrant};
