//! Axum HTTP handlers for account endpoints.
//!
//! # Usage
//!
//! ```ignore
//! use tickytiz_auth::http::account_routes;
//!
//! let app = Router::new().merge(account_routes()).with_state(app_state);
//! ```

pub mod account;

use std::sync::Arc;

use axum::{
    Router,
    extract::FromRef,
    routing::{patch, post},
};
use serde::{Deserialize, Serialize};

use crate::middleware::AuthState;
use crate::service::AccountService;

pub use account::{
    ChangePasswordRequest, CredentialsRequest, LoginResponse, RegisterResponse,
    change_password_handler, login_handler, logout_handler, register_handler,
};

/// Success envelope returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Always `true`; errors use the envelope from
    /// [`crate::middleware::error_body`].
    pub success: bool,
    /// Human readable outcome.
    pub message: String,
    /// Payload, omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// A response carrying only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    /// A response carrying a payload.
    #[must_use]
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Routes for login, logout, registration and password change.
pub fn account_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    AuthState: FromRef<S>,
    Arc<AccountService>: FromRef<S>,
{
    Router::new()
        .route("/auth", post(login_handler).delete(logout_handler))
        .route("/auth/register", post(register_handler))
        .route("/user/password", patch(change_password_handler))
}
