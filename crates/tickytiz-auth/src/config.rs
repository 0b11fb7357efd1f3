//! Authentication configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::password::{PasswordError, PasswordHashParams, PasswordHasher};
use crate::token::{JwtError, JwtService};

/// Authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// jwt_secret = "change-me"
/// token_lifetime = "24h"
/// min_password_length = 6
/// store_timeout = "2s"
///
/// [auth.password_hash]
/// memory_kib = 65536
/// time_cost = 2
/// parallelism = 1
/// max_concurrent = 4
/// ```
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign identity tokens. Required.
    pub jwt_secret: String,

    /// Lifetime of issued tokens.
    #[serde(with = "humantime_serde")]
    pub token_lifetime: Duration,

    /// Minimum accepted password length, in characters.
    pub min_password_length: usize,

    /// Deadline for a single revocation store call.
    #[serde(with = "humantime_serde")]
    pub store_timeout: Duration,

    /// Argon2id parameters for new hashes.
    pub password_hash: PasswordHashConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_lifetime: Duration::from_secs(24 * 3600),
            min_password_length: 6,
            store_timeout: Duration::from_secs(2),
            password_hash: PasswordHashConfig::default(),
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[redacted]")
            .field("token_lifetime", &self.token_lifetime)
            .field("min_password_length", &self.min_password_length)
            .field("store_timeout", &self.store_timeout)
            .field("password_hash", &self.password_hash)
            .finish()
    }
}

/// Password hashing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordHashConfig {
    /// Argon2id cost parameters.
    #[serde(flatten)]
    pub params: PasswordHashParams,

    /// Maximum number of concurrent derivations.
    pub max_concurrent: usize,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        Self {
            params: PasswordHashParams::default(),
            max_concurrent: 4,
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// - `Missing` if `jwt_secret` is empty.
    /// - `InvalidValue` for a zero token lifetime, store timeout, password
    ///   length, worker count, or rejected hash parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("auth.jwt_secret".to_string()));
        }
        if self.token_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.token_lifetime must be positive".to_string(),
            ));
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "auth.store_timeout must be positive".to_string(),
            ));
        }
        if self.min_password_length == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.min_password_length must be positive".to_string(),
            ));
        }
        if self.password_hash.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.password_hash.max_concurrent must be positive".to_string(),
            ));
        }
        self.password_hash
            .params
            .validate()
            .map_err(|e| ConfigError::InvalidValue(format!("auth.password_hash: {e}")))
    }

    /// Builds the token service from `jwt_secret` and `token_lifetime`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for an empty secret or an unrepresentable lifetime.
    pub fn jwt_service(&self) -> Result<JwtService, JwtError> {
        let lifetime = time::Duration::try_from(self.token_lifetime)
            .map_err(|_| JwtError::invalid_key("token lifetime out of range"))?;
        JwtService::new(self.jwt_secret.as_bytes(), lifetime)
    }

    /// Builds the password hasher from `password_hash`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` if the parameters are rejected.
    pub fn password_hasher(&self) -> Result<PasswordHasher, PasswordError> {
        PasswordHasher::new(
            self.password_hash.params.clone(),
            self.password_hash.max_concurrent,
        )
    }
}
