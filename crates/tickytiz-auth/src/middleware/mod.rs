//! HTTP middleware for authentication and authorization.
//!
//! This module provides Axum extractors for:
//!
//! - Bearer token extraction and validation ([`BearerAuth`])
//! - Route role checks ([`Authorized`] with a [`RoleSet`])
//! - Uniform JSON error responses
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use tickytiz_auth::middleware::{AdminOnly, AuthState, Authorized};
//!
//! async fn dashboard(admin: Authorized<AdminOnly>) -> String {
//!     format!("Hello, admin {}", admin.subject_id())
//! }
//!
//! let auth_state = AuthState::new(jwt_service, revoked_tokens);
//!
//! let app = Router::new()
//!     .route("/admin", get(dashboard))
//!     .with_state(auth_state);
//! ```

pub mod auth;
pub mod error;
pub mod types;

pub(crate) use auth::with_deadline;
pub use auth::{AuthState, Authorized, BearerAuth, authenticate, authorize};
pub use error::error_body;
pub use types::{AdminOnly, AnyRole, Identity, RoleSet, UserOnly};
