//! Redis-backed revoked token storage.
//!
//! Shared by every server instance, so a logout on one instance rejects the
//! token on all of them. Entries expire with the token (`SET .. PX`).
//!
//! Timeouts are applied by the callers (`AuthState` and `AccountService`),
//! which turn an elapsed deadline into `StoreUnavailable`.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::{debug, warn};

use tickytiz_auth::storage::revocation_key;
use tickytiz_auth::{AuthError, AuthResult, RevokedTokenStorage};

/// Revocation list stored in Redis.
#[derive(Clone)]
pub struct RedisRevokedTokenStorage {
    pool: Pool,
    key_prefix: String,
}

impl RedisRevokedTokenStorage {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            key_prefix: String::new(),
        }
    }

    /// Namespace keys, e.g. `tickytiz:revoked:<digest>`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn key(&self, token: &str) -> String {
        format!("{}{}", self.key_prefix, revocation_key(token))
    }

    async fn connection(&self) -> AuthResult<deadpool_redis::Connection> {
        self.pool.get().await.map_err(|e| {
            warn!(error = %e, "Failed to get Redis connection for revocation");
            AuthError::store_unavailable(format!("redis pool: {e}"))
        })
    }
}

fn unavailable(op: &str, e: redis::RedisError) -> AuthError {
    warn!(op, error = %e, "Revocation store command failed");
    AuthError::store_unavailable(format!("redis {op}: {e}"))
}

#[async_trait]
impl RevokedTokenStorage for RedisRevokedTokenStorage {
    async fn revoke(&self, token: &str, ttl: Duration) -> AuthResult<()> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if ttl_ms == 0 {
            return Err(AuthError::invalid_request(
                "cannot revoke a token with no remaining lifetime",
            ));
        }

        let mut conn = self.connection().await?;
        let _: () = redis::cmd("SET")
            .arg(self.key(token))
            .arg(1)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("SET", e))?;

        debug!(ttl_ms, "Token revoked");
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> AuthResult<bool> {
        let mut conn = self.connection().await?;
        conn.exists(self.key(token))
            .await
            .map_err(|e| unavailable("EXISTS", e))
    }
}
