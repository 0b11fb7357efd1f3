//! Account endpoint handlers.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `POST` | `/auth` | [`login_handler`] |
//! | `DELETE` | `/auth` | [`logout_handler`] |
//! | `POST` | `/auth/register` | [`register_handler`] |
//! | `PATCH` | `/user/password` | [`change_password_handler`] |

use std::fmt;
use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AuthError;
use crate::middleware::{Authorized, BearerAuth, UserOnly};
use crate::service::AccountService;
use crate::types::Role;

use super::ApiResponse;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Login and registration body.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    /// Login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

impl fmt::Debug for CredentialsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsRequest")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Password change body.
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    /// Current password.
    pub old_password: String,
    /// Replacement password.
    pub new_password: String,
}

impl fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChangePasswordRequest { .. }")
    }
}

/// Successful login payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token to send as `Authorization: Bearer <token>`.
    pub token: String,
    /// Account role.
    pub role: Role,
    /// Token expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Registration payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// New account id.
    pub id: i64,
}

// =============================================================================
// Handlers
// =============================================================================

/// `POST /auth`
pub async fn login_handler(
    State(accounts): State<Arc<AccountService>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, AuthError> {
    let outcome = accounts.login(&request.email, &request.password).await?;

    Ok(Json(ApiResponse::with_data(
        "Login successful",
        LoginResponse {
            token: outcome.token,
            role: outcome.role,
            expires_at: outcome.expires_at,
        },
    )))
}

/// `POST /auth/register`
pub async fn register_handler(
    State(accounts): State<Arc<AccountService>>,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegisterResponse>>), AuthError> {
    let id = accounts
        .register(&request.email, &request.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_data(
            "Register successful",
            RegisterResponse { id },
        )),
    ))
}

/// `DELETE /auth`
///
/// Requires the token being logged out as the bearer credential.
pub async fn logout_handler(
    State(accounts): State<Arc<AccountService>>,
    BearerAuth(identity): BearerAuth,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    accounts.logout(&identity).await?;
    Ok(Json(ApiResponse::message("Logout successful")))
}

/// `PATCH /user/password`
pub async fn change_password_handler(
    State(accounts): State<Arc<AccountService>>,
    user: Authorized<UserOnly>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AuthError> {
    accounts
        .change_password(&user, &request.old_password, &request.new_password)
        .await?;
    Ok(Json(ApiResponse::message("Password updated")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_debug_redacts_password() {
        let request = CredentialsRequest {
            email: "a@x.com".to_string(),
            password: "secret1".to_string(),
        };
        assert!(!format!("{request:?}").contains("secret1"));

        let request = ChangePasswordRequest {
            old_password: "secret1".to_string(),
            new_password: "secret2".to_string(),
        };
        assert!(!format!("{request:?}").contains("secret"));
    }

    #[test]
    fn test_login_response_shape() {
        let response = ApiResponse::with_data(
            "Login successful",
            LoginResponse {
                token: "t".to_string(),
                role: Role::User,
                expires_at: OffsetDateTime::UNIX_EPOCH,
            },
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["role"], "user");
        assert_eq!(json["data"]["expires_at"], "1970-01-01T00:00:00Z");
    }
}
