//! Account flows: registration, login, logout and password change.
//!
//! These tie the credential hasher, token issuer and revocation store
//! together. Login never reveals whether an email is registered: unknown
//! accounts, wrong passwords and unreadable stored hashes all end in the
//! same `Unauthorized`.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::middleware::{Identity, with_deadline};
use crate::password::PasswordHasher;
use crate::storage::{AccountStorage, RevokedTokenStorage};
use crate::token::jwt::JwtService;
use crate::types::Role;

const INVALID_CREDENTIALS: &str = "invalid email or password";

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Account id.
    pub subject_id: i64,
    /// Account role.
    pub role: Role,
    /// Signed bearer token.
    pub token: String,
    /// Absolute token expiry.
    pub expires_at: OffsetDateTime,
}

/// Account service shared by the HTTP handlers.
pub struct AccountService {
    accounts: Arc<dyn AccountStorage>,
    hasher: PasswordHasher,
    jwt_service: Arc<JwtService>,
    revoked_tokens: Arc<dyn RevokedTokenStorage>,
    min_password_length: usize,
    store_timeout: Duration,
}

impl AccountService {
    /// Creates a service with a minimum password length of 6 and a 2 second
    /// revocation store deadline.
    pub fn new(
        accounts: Arc<dyn AccountStorage>,
        hasher: PasswordHasher,
        jwt_service: Arc<JwtService>,
        revoked_tokens: Arc<dyn RevokedTokenStorage>,
    ) -> Self {
        Self {
            accounts,
            hasher,
            jwt_service,
            revoked_tokens,
            min_password_length: 6,
            store_timeout: Duration::from_secs(2),
        }
    }

    /// Sets the minimum password length in characters.
    #[must_use]
    pub fn with_min_password_length(mut self, min_password_length: usize) -> Self {
        self.min_password_length = min_password_length;
        self
    }

    /// Sets the revocation store deadline.
    #[must_use]
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Registers a new `user` account.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an invalid email or a short password.
    /// - `Conflict` if the email is taken.
    pub async fn register(&self, email: &str, password: &str) -> AuthResult<i64> {
        validate_email(email)?;
        self.validate_password(password)?;

        let hash = self.hasher.hash(password).await?;
        let id = self.accounts.create_account(email, &hash).await?;

        tracing::info!(subject_id = id, "Account registered");
        Ok(id)
    }

    /// Verifies credentials and issues a token.
    ///
    /// If the stored hash was made with older cost parameters it is replaced
    /// with one using the current parameters. That upgrade is best-effort.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for any credential problem.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<LoginOutcome> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            self.hasher.burn(password).await;
            tracing::debug!("Login for unknown email");
            return Err(AuthError::unauthorized(INVALID_CREDENTIALS));
        };

        match self.hasher.verify(password, &account.password_hash).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(subject_id = account.id, "Login with wrong password");
                return Err(AuthError::unauthorized(INVALID_CREDENTIALS));
            }
            Err(e) if e.is_decode_error() => {
                tracing::error!(subject_id = account.id, error = %e, "Stored password hash is unreadable");
                return Err(AuthError::unauthorized(INVALID_CREDENTIALS));
            }
            Err(e) => return Err(e.into()),
        }

        if self.hasher.needs_rehash(&account.password_hash) {
            self.upgrade_hash(account.id, password).await;
        }

        let issued = self.jwt_service.issue(account.id, account.role)?;
        tracing::info!(subject_id = account.id, jti = %issued.claims.jti, "Login successful");

        Ok(LoginOutcome {
            subject_id: account.id,
            role: account.role,
            token: issued.token,
            expires_at: issued.expires_at,
        })
    }

    /// Revokes the presenting token for the rest of its lifetime.
    ///
    /// # Errors
    ///
    /// - `TokenExpired` if no lifetime is left.
    /// - `StoreUnavailable` if the revocation could not be persisted; logout
    ///   is not reported as successful in that case.
    pub async fn logout(&self, identity: &Identity) -> AuthResult<()> {
        let ttl = remaining_ttl(identity.expires_at(), OffsetDateTime::now_utc())
            .ok_or(AuthError::TokenExpired)?;

        with_deadline(
            self.store_timeout,
            "revoke",
            self.revoked_tokens.revoke(identity.token(), ttl),
        )
        .await
        .inspect_err(|e| {
            tracing::error!(jti = %identity.jti(), error = %e, "Failed to revoke token on logout");
        })?;

        tracing::info!(
            subject_id = identity.subject_id(),
            jti = %identity.jti(),
            ttl_secs = ttl.as_secs(),
            "Token revoked"
        );
        Ok(())
    }

    /// Changes the password of the authenticated account.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if `old_password` is wrong.
    /// - `InvalidRequest` if `new_password` is too short.
    pub async fn change_password(
        &self,
        identity: &Identity,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        self.validate_password(new_password)?;

        let stored = self
            .accounts
            .password_hash(identity.subject_id())
            .await?
            .ok_or_else(|| AuthError::unauthorized("account not found"))?;

        match self.hasher.verify(old_password, &stored).await {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::unauthorized("old password does not match")),
            Err(e) if e.is_decode_error() => {
                tracing::error!(subject_id = identity.subject_id(), error = %e, "Stored password hash is unreadable");
                return Err(AuthError::unauthorized("old password does not match"));
            }
            Err(e) => return Err(e.into()),
        }

        let hash = self.hasher.hash(new_password).await?;
        self.accounts
            .update_password(identity.subject_id(), &hash)
            .await?;

        tracing::info!(subject_id = identity.subject_id(), "Password changed");
        Ok(())
    }

    async fn upgrade_hash(&self, account_id: i64, password: &str) {
        let result: Result<(), AuthError> = async {
            let hash = self.hasher.hash(password).await.map_err(AuthError::from)?;
            self.accounts.update_password(account_id, &hash).await
        }
        .await;

        match result {
            Ok(()) => tracing::info!(subject_id = account_id, "Password hash upgraded"),
            Err(e) => tracing::warn!(subject_id = account_id, error = %e, "Password hash upgrade failed"),
        }
    }

    fn validate_password(&self, password: &str) -> AuthResult<()> {
        if password.chars().count() < self.min_password_length {
            return Err(AuthError::invalid_request(format!(
                "password must be at least {} characters",
                self.min_password_length
            )));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> AuthResult<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty())
        && !email.chars().any(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(AuthError::invalid_request("email is not valid"))
    }
}

/// Lifetime left on a token, truncated to whole milliseconds. `None` once
/// less than a millisecond remains, the finest TTL a store can record.
fn remaining_ttl(expires_at: OffsetDateTime, now: OffsetDateTime) -> Option<Duration> {
    let remaining = Duration::try_from(expires_at - now).ok()?;
    let millis = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
    (millis > 0).then(|| Duration::from_millis(millis))
}
