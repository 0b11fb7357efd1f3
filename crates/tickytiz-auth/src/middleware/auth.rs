//! Bearer token authentication and role authorization extractors.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use tickytiz_auth::middleware::{AuthState, Authorized, BearerAuth, UserOnly};
//!
//! async fn whoami(BearerAuth(identity): BearerAuth) -> String {
//!     format!("account {}", identity.subject_id())
//! }
//!
//! async fn history(user: Authorized<UserOnly>) -> String {
//!     format!("history of {}", user.subject_id())
//! }
//!
//! let app = Router::new()
//!     .route("/whoami", get(whoami))
//!     .route("/user/history", get(history))
//!     .with_state(auth_state);
//! ```

use std::future::Future;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::AuthResult;
use crate::error::AuthError;
use crate::storage::RevokedTokenStorage;
use crate::token::jwt::{JwtError, JwtService};
use crate::types::Role;

use super::types::{Identity, RoleSet};

// =============================================================================
// Auth State
// =============================================================================

/// State required for bearer token authentication.
///
/// Include it in the application state and expose it through `FromRef`.
///
/// ```ignore
/// #[derive(Clone)]
/// struct AppState {
///     auth: AuthState,
/// }
///
/// impl FromRef<AppState> for AuthState {
///     fn from_ref(state: &AppState) -> Self {
///         state.auth.clone()
///     }
/// }
/// ```
#[derive(Clone)]
pub struct AuthState {
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,

    /// Revoked token storage consulted on every request.
    pub revoked_tokens: Arc<dyn RevokedTokenStorage>,

    /// Deadline for a single revocation store call.
    pub store_timeout: Duration,
}

impl AuthState {
    /// Creates a new auth state with a 2 second store deadline.
    pub fn new(jwt_service: Arc<JwtService>, revoked_tokens: Arc<dyn RevokedTokenStorage>) -> Self {
        Self {
            jwt_service,
            revoked_tokens,
            store_timeout: Duration::from_secs(2),
        }
    }

    /// Sets the revocation store deadline.
    #[must_use]
    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }
}

/// Runs a store call under a deadline. Running out of time is reported as
/// `StoreUnavailable`, same as a backend error.
pub(crate) async fn with_deadline<T, F>(timeout: Duration, op: &'static str, fut: F) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op, timeout_ms = timeout.as_millis() as u64, "Revocation store deadline exceeded");
            Err(AuthError::store_unavailable(format!("{op} timed out")))
        }
    }
}

// =============================================================================
// Authentication
// =============================================================================

/// Resolves an identity from an `Authorization` header value.
///
/// Checks run in a fixed order: header present and well formed, signature,
/// expiry, revocation. The first failing check aborts.
///
/// # Errors
///
/// - `Unauthorized` for a missing or malformed header.
/// - `InvalidToken` for a bad signature or undecodable token.
/// - `TokenExpired` once `exp <= now`.
/// - `TokenRevoked` if the token was logged out.
/// - `StoreUnavailable` if the revocation store cannot answer in time. The
///   request is rejected rather than treated as not revoked.
pub async fn authenticate(state: &AuthState, header: Option<&str>) -> AuthResult<Identity> {
    let header = header.ok_or_else(|| AuthError::unauthorized("Missing Authorization header"))?;

    let token = bearer_token(header)
        .ok_or_else(|| AuthError::unauthorized("Malformed Authorization header"))?;

    let claims = state.jwt_service.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Failed to verify token");
        match e {
            JwtError::Expired => AuthError::TokenExpired,
            other => AuthError::invalid_token(other.to_string()),
        }
    })?;
    let subject_id = claims.subject_id()?;
    let expires_at = claims.expires_at()?;

    let revoked = with_deadline(
        state.store_timeout,
        "is_revoked",
        state.revoked_tokens.is_revoked(token),
    )
    .await?;
    if revoked {
        tracing::debug!(jti = %claims.jti, "Token revoked");
        return Err(AuthError::TokenRevoked);
    }

    tracing::debug!(jti = %claims.jti, subject_id, role = %claims.role, "Token validated");

    Ok(Identity::new(subject_id, &claims, expires_at, token.to_string()))
}

/// Extracts the credential from a `Bearer` header. The scheme name is
/// matched case-insensitively.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty() && !token.contains(' ')).then_some(token)
}

/// Checks an authenticated identity against a route's permitted roles.
///
/// # Errors
///
/// Returns `Forbidden` if the identity's role is not in `allowed`.
pub fn authorize(identity: &Identity, allowed: &[Role]) -> AuthResult<()> {
    if allowed.contains(&identity.role()) {
        Ok(())
    } else {
        tracing::debug!(
            subject_id = identity.subject_id(),
            role = %identity.role(),
            "Role not permitted on route"
        );
        Err(AuthError::forbidden("Role not permitted"))
    }
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Axum extractor that runs [`authenticate`] on the request.
///
/// # Errors
///
/// Rejects with `AuthError` (which implements `IntoResponse`).
pub struct BearerAuth(pub Identity);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(
                value
                    .to_str()
                    .map_err(|_| AuthError::unauthorized("Malformed Authorization header"))?,
            ),
            None => None,
        };

        authenticate(&auth_state, header).await.map(BearerAuth)
    }
}

// =============================================================================
// Authorized Extractor
// =============================================================================

/// Axum extractor that authenticates and then checks the role set `R`.
///
/// Authorization only ever sees an [`Identity`] produced by authentication,
/// so the two gates cannot run out of order.
pub struct Authorized<R: RoleSet> {
    identity: Identity,
    _roles: PhantomData<fn() -> R>,
}

impl<R: RoleSet> Authorized<R> {
    /// Applies the role set to an already authenticated identity.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if the role is not permitted.
    pub fn check(identity: Identity) -> AuthResult<Self> {
        authorize(&identity, R::ROLES)?;
        Ok(Self {
            identity,
            _roles: PhantomData,
        })
    }

    /// Consumes the wrapper and returns the identity.
    #[must_use]
    pub fn into_identity(self) -> Identity {
        self.identity
    }
}

impl<R: RoleSet> Deref for Authorized<R> {
    type Target = Identity;

    fn deref(&self) -> &Identity {
        &self.identity
    }
}

impl<S, R> FromRequestParts<S> for Authorized<R>
where
    S: Send + Sync,
    AuthState: FromRef<S>,
    R: RoleSet,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let BearerAuth(identity) = BearerAuth::from_request_parts(parts, state).await?;
        Self::check(identity)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::types::{AdminOnly, AnyRole, UserOnly};
    use crate::storage::InMemoryRevokedTokenStorage;
    use crate::token::jwt::TokenClaims;
    use async_trait::async_trait;

    struct UnreachableStore;

    #[async_trait]
    impl RevokedTokenStorage for UnreachableStore {
        async fn revoke(&self, _token: &str, _ttl: Duration) -> AuthResult<()> {
            Err(AuthError::store_unavailable("connection refused"))
        }

        async fn is_revoked(&self, _token: &str) -> AuthResult<bool> {
            Err(AuthError::store_unavailable("connection refused"))
        }
    }

    struct HangingStore;

    #[async_trait]
    impl RevokedTokenStorage for HangingStore {
        async fn revoke(&self, _token: &str, _ttl: Duration) -> AuthResult<()> {
            std::future::pending().await
        }

        async fn is_revoked(&self, _token: &str) -> AuthResult<bool> {
            std::future::pending().await
        }
    }

    fn state_with(store: Arc<dyn RevokedTokenStorage>) -> AuthState {
        let jwt = JwtService::new(b"test-secret", time::Duration::hours(1)).unwrap();
        AuthState::new(Arc::new(jwt), store).with_store_timeout(Duration::from_millis(50))
    }

    fn state() -> AuthState {
        state_with(Arc::new(InMemoryRevokedTokenStorage::new()))
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn test_valid_token_authenticates() {
        let state = state();
        let issued = state.jwt_service.issue(42, Role::User).unwrap();

        let identity = authenticate(&state, Some(&bearer(&issued.token)))
            .await
            .unwrap();
        assert_eq!(identity.subject_id(), 42);
        assert_eq!(identity.role(), Role::User);
        assert_eq!(identity.token(), issued.token);
        assert_eq!(identity.expires_at(), issued.expires_at);
    }

    #[tokio::test]
    async fn test_missing_header() {
        let err = authenticate(&state(), None).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_malformed_header() {
        let state = state();
        for header in ["Basic abc", "Bearer", "Bearer ", "Bearerabc", "Bearer a b"] {
            let err = authenticate(&state, Some(header)).await.unwrap_err();
            assert!(
                matches!(err, AuthError::Unauthorized { .. }),
                "{header:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let state = state();
        let issued = state.jwt_service.issue(7, Role::Admin).unwrap();

        for scheme in ["bearer", "BEARER", "bEaReR"] {
            let header = format!("{scheme} {}", issued.token);
            let identity = authenticate(&state, Some(&header)).await.unwrap();
            assert_eq!(identity.subject_id(), 7);
        }
    }

    #[tokio::test]
    async fn test_bad_signature() {
        let state = state();
        let other = JwtService::new(b"other-secret", time::Duration::hours(1)).unwrap();
        let forged = other.issue(42, Role::Admin).unwrap();

        let err = authenticate(&state, Some(&bearer(&forged.token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let state = state();
        let claims = TokenClaims::builder(42, Role::User)
            .expires_in_seconds(-10)
            .build();
        let token = state.jwt_service.encode(&claims).unwrap();

        let err = authenticate(&state, Some(&bearer(&token))).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn test_revoked_token() {
        let store = Arc::new(InMemoryRevokedTokenStorage::new());
        let state = state_with(store.clone());
        let issued = state.jwt_service.issue(42, Role::User).unwrap();

        store
            .revoke(&issued.token, Duration::from_secs(60))
            .await
            .unwrap();

        let err = authenticate(&state, Some(&bearer(&issued.token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_closed() {
        let state = state_with(Arc::new(UnreachableStore));
        let issued = state.jwt_service.issue(42, Role::User).unwrap();

        let err = authenticate(&state, Some(&bearer(&issued.token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_store_deadline_fails_closed() {
        let state = state_with(Arc::new(HangingStore));
        let issued = state.jwt_service.issue(42, Role::User).unwrap();

        let err = authenticate(&state, Some(&bearer(&issued.token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_signature_checked_before_store() {
        // A forged token must be rejected without consulting the store.
        let state = state_with(Arc::new(HangingStore));
        let err = authenticate(&state, Some("Bearer not.a.jwt")).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn test_authorize_role_sets() {
        let state = state();
        let user_token = state.jwt_service.issue(1, Role::User).unwrap().token;
        let admin_token = state.jwt_service.issue(2, Role::Admin).unwrap().token;

        let user = authenticate(&state, Some(&bearer(&user_token))).await.unwrap();
        let admin = authenticate(&state, Some(&bearer(&admin_token))).await.unwrap();

        assert!(Authorized::<UserOnly>::check(user.clone()).is_ok());
        assert!(matches!(
            Authorized::<AdminOnly>::check(user.clone()).err(),
            Some(AuthError::Forbidden { .. })
        ));
        assert!(Authorized::<AdminOnly>::check(admin.clone()).is_ok());
        assert!(Authorized::<UserOnly>::check(admin.clone()).is_err());
        assert!(Authorized::<AnyRole>::check(user).is_ok());
        assert!(authorize(&admin, &[]).is_err());
    }
}
