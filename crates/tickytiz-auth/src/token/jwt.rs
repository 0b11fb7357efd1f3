//! JWT token generation and validation.
//!
//! Tokens are signed with HS256 using a process-wide secret that is fixed
//! when the [`JwtService`] is built. Every token carries the subject id,
//! the account role, `iat`, `exp` and a random `jti`.
//!
//! ## Example
//!
//! ```ignore
//! use tickytiz_auth::token::jwt::JwtService;
//! use tickytiz_auth::types::Role;
//!
//! let jwt = JwtService::new(b"change-me", time::Duration::hours(24))?;
//! let issued = jwt.issue(42, Role::User)?;
//! let claims = jwt.verify(&issued.token)?;
//! assert_eq!(claims.subject_id()?, 42);
//! ```

use std::fmt;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::types::Role;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidKey` error.
    #[must_use]
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a validation error (expired, invalid signature, etc.).
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::InvalidSignature | Self::InvalidClaims { .. }
        )
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => Self::decoding_error(err.to_string()),
            ErrorKind::InvalidSubject | ErrorKind::MissingRequiredClaim(_) => {
                Self::invalid_claims(err.to_string())
            }
            ErrorKind::InvalidKeyFormat => Self::invalid_key(err.to_string()),
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

// ============================================================================
// Token Claims
// ============================================================================

/// Identity token claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Subject (decimal account id).
    pub sub: String,

    /// Account role.
    pub role: Role,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// JWT ID, used to refer to the token in logs.
    pub jti: String,
}

impl TokenClaims {
    /// Creates a new builder for identity token claims.
    #[must_use]
    pub fn builder(subject_id: i64, role: Role) -> TokenClaimsBuilder {
        TokenClaimsBuilder::new(subject_id, role)
    }

    /// Parses the numeric subject id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaims` if `sub` is not an integer.
    pub fn subject_id(&self) -> Result<i64, JwtError> {
        self.sub
            .parse()
            .map_err(|_| JwtError::invalid_claims("sub is not a numeric id"))
    }

    /// Returns the expiry as a timestamp.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaims` if `exp` is out of range.
    pub fn expires_at(&self) -> Result<OffsetDateTime, JwtError> {
        OffsetDateTime::from_unix_timestamp(self.exp)
            .map_err(|_| JwtError::invalid_claims("exp out of range"))
    }

    /// Time left until `exp`, or zero when already expired.
    #[must_use]
    pub fn remaining_lifetime(&self, now: OffsetDateTime) -> std::time::Duration {
        let secs = self.exp - now.unix_timestamp();
        std::time::Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

/// Builder for `TokenClaims`.
pub struct TokenClaimsBuilder {
    sub: String,
    role: Role,
    iat: i64,
    exp: i64,
    jti: String,
}

impl TokenClaimsBuilder {
    fn new(subject_id: i64, role: Role) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            sub: subject_id.to_string(),
            role,
            iat: now,
            exp: now + 24 * 3600,
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Sets the expiration time in seconds from now.
    #[must_use]
    pub fn expires_in_seconds(mut self, seconds: i64) -> Self {
        self.exp = self.iat + seconds;
        self
    }

    /// Builds the claims.
    #[must_use]
    pub fn build(self) -> TokenClaims {
        TokenClaims {
            sub: self.sub,
            role: self.role,
            iat: self.iat,
            exp: self.exp,
            jti: self.jti,
        }
    }
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The compact JWT string.
    pub token: String,
    /// Absolute expiry.
    pub expires_at: OffsetDateTime,
    /// The signed claims.
    pub claims: TokenClaims,
}

// ============================================================================
// JWT Service
// ============================================================================

/// Service for issuing and verifying identity tokens.
///
/// This service is thread-safe (`Send + Sync`) and can be shared across
/// async tasks. The secret cannot be changed after construction.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl fmt::Debug for JwtService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &Algorithm::HS256)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Creates a new JWT service.
    ///
    /// # Arguments
    /// * `secret` - Shared HMAC secret
    /// * `lifetime` - Validity of issued tokens
    ///
    /// # Errors
    /// Returns `InvalidKey` for an empty secret or a non-positive lifetime.
    pub fn new(secret: &[u8], lifetime: Duration) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::invalid_key("JWT secret must not be empty"));
        }
        if !lifetime.is_positive() {
            return Err(JwtError::invalid_key("token lifetime must be positive"));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        })
    }

    /// Returns the configured token lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Mints a token for the subject with `exp = now + lifetime`.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn issue(&self, subject_id: i64, role: Role) -> Result<IssuedToken, JwtError> {
        let claims = TokenClaims::builder(subject_id, role)
            .expires_in_seconds(self.lifetime.whole_seconds())
            .build();
        let token = self.encode(&claims)?;
        let expires_at = claims.expires_at()?;

        tracing::debug!(jti = %claims.jti, subject_id, role = %role, "Issued token");

        Ok(IssuedToken {
            token,
            expires_at,
            claims,
        })
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Verifies the signature first, then expiry, and returns the claims.
    ///
    /// A token whose `exp` equals the current second is already expired.
    ///
    /// # Errors
    /// - `InvalidSignature` if the token was not signed with this secret.
    /// - `Expired` if `exp <= now`.
    /// - `DecodingError` / `InvalidClaims` for structurally invalid tokens.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, JwtError> {
        let claims = self.decode::<TokenClaims>(token)?.claims;
        claims.subject_id()?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if claims.exp <= now {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }

    /// Decodes and validates a JWT string.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode(token, &self.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Decodes a JWT without validating expiration.
    ///
    /// # Errors
    /// Returns an error if decoding fails (signature is still validated).
    pub fn decode_allow_expired<T: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        decode(token, &self.decoding_key, &validation).map_err(JwtError::from)
    }
}

// ============================================================================
// Tests
// ============================================================================
