//! Revoked bearer token storage trait.
//!
//! When a user logs out, the presenting token is recorded here until the
//! moment it would have expired anyway. The authentication gate consults the
//! store on every request.
//!
//! # Security Considerations
//!
//! - The entry TTL must equal the token's remaining lifetime so records
//!   never outlive the token.
//! - Implementations must report backend failures as errors. A lookup that
//!   cannot be answered is never "not revoked".
//! - Raw tokens are not used as keys; [`revocation_key`] hashes them so key
//!   length is bounded and tokens never appear in the store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::AuthResult;
use crate::error::AuthError;

/// Prefix shared by every revocation key.
pub const REVOCATION_KEY_PREFIX: &str = "revoked:";

/// Derives the store key identifying a token.
#[must_use]
pub fn revocation_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{REVOCATION_KEY_PREFIX}{}", hex::encode(digest))
}

/// Storage trait for revoked bearer tokens.
///
/// # Implementations
///
/// - [`InMemoryRevokedTokenStorage`] - single-process deployments and tests
/// - `tickytiz_server::revocation::RedisRevokedTokenStorage` - shared store
#[async_trait]
pub trait RevokedTokenStorage: Send + Sync {
    /// Marks a token as revoked for `ttl`.
    ///
    /// `ttl` must be the token's remaining lifetime. Revoking an already
    /// revoked token succeeds and refreshes the TTL.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if `ttl` is zero.
    /// - `StoreUnavailable` if the entry could not be persisted. Callers must
    ///   not report logout as successful in that case.
    async fn revoke(&self, token: &str, ttl: Duration) -> AuthResult<()>;

    /// Checks whether a token has been revoked.
    ///
    /// Called on every authenticated request.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be reached. The
    /// authentication gate rejects the request in that case.
    async fn is_revoked(&self, token: &str) -> AuthResult<bool>;
}

/// In-process revocation store backed by a `DashMap`.
///
/// Entries are evicted lazily on lookup and by [`Self::purge_expired`].
#[derive(Debug, Default)]
pub struct InMemoryRevokedTokenStorage {
    entries: DashMap<String, Instant>,
}

impl InMemoryRevokedTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops entries whose TTL has elapsed and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, deadline| *deadline > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of live and not-yet-purged entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevokedTokenStorage for InMemoryRevokedTokenStorage {
    async fn revoke(&self, token: &str, ttl: Duration) -> AuthResult<()> {
        if ttl.is_zero() {
            return Err(AuthError::invalid_request(
                "cannot revoke a token with no remaining lifetime",
            ));
        }
        self.entries.insert(revocation_key(token), Instant::now() + ttl);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> AuthResult<bool> {
        let key = revocation_key(token);
        let live = match self.entries.get(&key) {
            Some(deadline) => *deadline > Instant::now(),
            None => return Ok(false),
        };
        if !live {
            self.entries.remove_if(&key, |_, deadline| *deadline <= Instant::now());
        }
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revocation_key_is_hashed() {
        let key = revocation_key("header.payload.signature");
        assert!(key.starts_with(REVOCATION_KEY_PREFIX));
        assert_eq!(key.len(), REVOCATION_KEY_PREFIX.len() + 64);
        assert!(!key.contains("payload"));
        assert_eq!(key, revocation_key("header.payload.signature"));
        assert_ne!(key, revocation_key("header.payload.signaturf"));
    }

    #[tokio::test]
    async fn test_revoke_then_check() {
        let store = InMemoryRevokedTokenStorage::new();
        assert!(!store.is_revoked("t1").await.unwrap());

        store.revoke("t1", Duration::from_secs(60)).await.unwrap();
        assert!(store.is_revoked("t1").await.unwrap());
        assert!(!store.is_revoked("t2").await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_expires_with_ttl() {
        let store = InMemoryRevokedTokenStorage::new();
        store.revoke("t1", Duration::from_millis(100)).await.unwrap();
        assert!(store.is_revoked("t1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!store.is_revoked("t1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let store = InMemoryRevokedTokenStorage::new();
        let err = store.revoke("t1", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRequest { .. }));
        assert!(!store.is_revoked("t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryRevokedTokenStorage::new();
        store.revoke("short", Duration::from_millis(10)).await.unwrap();
        store.revoke("long", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }
}
