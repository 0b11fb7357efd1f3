//! # tickytiz-auth
//!
//! Authentication and authorization for the Tickytiz ticketing backend.
//!
//! This crate provides:
//! - Argon2id password hashing with a self-describing encoded format
//! - HS256 identity tokens carrying subject id and role
//! - Server-side token revocation (logout)
//! - Axum extractors for authentication and role checks
//! - Registration, login, logout and password change flows
//!
//! ## Modules
//!
//! - [`config`] - Authentication configuration
//! - [`password`] - Credential hasher
//! - [`token`] - Token issuing and verification
//! - [`storage`] - Revocation and account storage traits
//! - [`middleware`] - Authentication and authorization gates
//! - [`service`] - Account flows
//! - [`http`] - Axum handlers for account endpoints

pub mod config;
pub mod error;
pub mod http;
pub mod middleware;
pub mod password;
pub mod service;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError, PasswordHashConfig};
pub use error::{AuthError, ErrorCategory};
pub use http::{ApiResponse, account_routes};
pub use middleware::{
    AdminOnly, AnyRole, AuthState, Authorized, BearerAuth, Identity, RoleSet, UserOnly,
    authenticate, authorize,
};
pub use password::{
    PasswordError, PasswordHashParams, PasswordHasher, hash_password_with, verify_password,
};
pub use service::{AccountService, LoginOutcome};
pub use storage::{
    AccountStorage, InMemoryAccountStorage, InMemoryRevokedTokenStorage, RevokedTokenStorage,
};
pub use token::{JwtError, JwtService, TokenClaims};
pub use types::{Account, Role};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;
