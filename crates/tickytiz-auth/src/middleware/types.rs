//! Authenticated identity and route role sets.

use std::fmt;

use time::OffsetDateTime;

use crate::token::jwt::TokenClaims;
use crate::types::Role;

// =============================================================================
// Identity
// =============================================================================

/// Identity resolved by the authentication gate.
///
/// Only [`crate::middleware::authenticate`] can build one, so any code that
/// holds an `Identity` knows the token was verified and checked against the
/// revocation store.
#[derive(Clone)]
pub struct Identity {
    subject_id: i64,
    role: Role,
    jti: String,
    expires_at: OffsetDateTime,
    token: String,
}

impl Identity {
    pub(crate) fn new(
        subject_id: i64,
        claims: &TokenClaims,
        expires_at: OffsetDateTime,
        token: String,
    ) -> Self {
        Self {
            subject_id,
            role: claims.role,
            jti: claims.jti.clone(),
            expires_at,
            token,
        }
    }

    /// Account id from the `sub` claim.
    #[must_use]
    pub fn subject_id(&self) -> i64 {
        self.subject_id
    }

    /// Role from the `role` claim.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Token id, safe to log.
    #[must_use]
    pub fn jti(&self) -> &str {
        &self.jti
    }

    /// Absolute token expiry.
    #[must_use]
    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    /// The raw bearer token, needed to revoke it on logout.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject_id", &self.subject_id)
            .field("role", &self.role)
            .field("jti", &self.jti)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Role Sets
// =============================================================================

/// A route's permitted roles, declared at the type level.
///
/// ```ignore
/// async fn create_movie(admin: Authorized<AdminOnly>) -> impl IntoResponse { ... }
/// ```
pub trait RoleSet: Send + Sync + 'static {
    /// Roles allowed through the gate.
    const ROLES: &'static [Role];
}

/// Routes for customers (orders, profile, history, password change).
#[derive(Debug, Clone, Copy)]
pub struct UserOnly;

impl RoleSet for UserOnly {
    const ROLES: &'static [Role] = &[Role::User];
}

/// Back-office routes (movie and master data administration).
#[derive(Debug, Clone, Copy)]
pub struct AdminOnly;

impl RoleSet for AdminOnly {
    const ROLES: &'static [Role] = &[Role::Admin];
}

/// Any authenticated account.
#[derive(Debug, Clone, Copy)]
pub struct AnyRole;

impl RoleSet for AnyRole {
    const ROLES: &'static [Role] = &[Role::User, Role::Admin];
}
