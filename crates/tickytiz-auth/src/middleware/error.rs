//! Error response handling for authentication middleware.
//!
//! Every authentication failure produces the same 401 body so clients cannot
//! tell a bad password from an unknown account, or a forged token from a
//! revoked one. The detailed cause only goes to the log.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

/// Body message for every 401.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized Access";

/// Body message for every 403.
pub const FORBIDDEN_MESSAGE: &str = "Forbidden";

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);

        if status.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Auth request failed");
        } else {
            tracing::debug!(error = %self, category = %self.category(), "Auth request rejected");
        }
        if self.is_authentication_error() || self.is_authorization_error() {
            metrics::counter!("auth_failures_total", "reason" => self.reason()).increment(1);
        }

        let body = error_body(status, &message);

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(www_authenticate(&self)),
            );
        }

        (status, headers, Json(body)).into_response()
    }
}

/// Maps an error to its HTTP status and client-facing message.
fn error_details(error: &AuthError) -> (StatusCode, String) {
    if error.is_authentication_error() {
        return (StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE.to_string());
    }
    match error {
        AuthError::Forbidden { .. } => (StatusCode::FORBIDDEN, FORBIDDEN_MESSAGE.to_string()),
        AuthError::InvalidRequest { message } => (StatusCode::BAD_REQUEST, message.clone()),
        AuthError::Conflict { message } => (StatusCode::CONFLICT, message.clone()),
        AuthError::StoreUnavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable".to_string(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        ),
    }
}

/// `WWW-Authenticate` value for a 401.
///
/// Token problems share one error code regardless of cause.
fn www_authenticate(error: &AuthError) -> &'static str {
    if error.is_token_error() {
        r#"Bearer realm="tickytiz", error="invalid_token""#
    } else {
        r#"Bearer realm="tickytiz""#
    }
}

/// Builds the JSON error envelope shared by all handlers.
#[must_use]
pub fn error_body(status: StatusCode, message: &str) -> serde_json::Value {
    json!({
        "success": false,
        "status": status.canonical_reason().unwrap_or("Error"),
        "message": message,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::PasswordError;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_authentication_failures_are_uniform() {
        let errors = vec![
            AuthError::unauthorized("Missing Authorization header"),
            AuthError::unauthorized("no account for a@x.com"),
            AuthError::invalid_token("InvalidSignature"),
            AuthError::TokenExpired,
            AuthError::TokenRevoked,
            AuthError::from(PasswordError::malformed_hash("expected 6 fields")),
        ];

        let mut bodies = Vec::new();
        for error in errors {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
            bodies.push(body_json(response).await);
        }

        for body in &bodies {
            assert_eq!(body, &bodies[0]);
        }
        assert_eq!(bodies[0]["message"], UNAUTHORIZED_MESSAGE);
        assert_eq!(bodies[0]["success"], false);
    }

    #[tokio::test]
    async fn test_token_error_challenge() {
        let response = AuthError::TokenRevoked.into_response();
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(www_auth.contains("realm=\"tickytiz\""));
        assert!(www_auth.contains("error=\"invalid_token\""));

        let response = AuthError::unauthorized("Missing Authorization header").into_response();
        let www_auth = response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(!www_auth.contains("error="));
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let response = AuthError::forbidden("role user not in [admin]").into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(!response.headers().contains_key(header::WWW_AUTHENTICATE));
        let body = body_json(response).await;
        assert_eq!(body["message"], FORBIDDEN_MESSAGE);
    }

    #[tokio::test]
    async fn test_store_unavailable_response() {
        let response = AuthError::store_unavailable("redis: connection refused").into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert!(!body["message"].as_str().unwrap().contains("redis"));
    }

    #[tokio::test]
    async fn test_validation_messages_pass_through() {
        let response =
            AuthError::invalid_request("password must be at least 6 characters").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "password must be at least 6 characters");

        let response = AuthError::conflict("email already registered").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_server_error_hides_cause() {
        let response = AuthError::from(PasswordError::RandomSource).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Internal server error");
    }
}
