//! Password hashing with Argon2id.
//!
//! Hashes are stored as a single self-describing string:
//!
//! ```text
//! $argon2id$v=19$m=65536,t=2,p=1$<base64 salt>$<base64 key>
//! ```
//!
//! Base64 uses the standard alphabet without padding. Verification always
//! re-derives with the parameters recorded in the string, so changing the
//! defaults never invalidates existing hashes.
//!
//! The string is parsed here rather than through
//! `argon2::password_hash::PasswordHash`: the generic PHC parser accepts
//! optional fields and folds every failure into one error, while stored
//! hashes must have exactly six fields and report malformed input apart
//! from an unsupported algorithm.
//!
//! The KDF is deliberately slow. Async callers go through [`PasswordHasher`],
//! which runs derivation on the blocking pool behind a semaphore.

use std::fmt;
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConstantTimeEq};
use tokio::sync::Semaphore;

/// Algorithm tag written into every encoded hash.
pub const ALGORITHM_TAG: &str = "argon2id";

/// Argon2 version 0x13, encoded as decimal.
pub const ALGORITHM_VERSION: u32 = 19;

const FIELD_COUNT: usize = 6;

// ============================================================================
// Error Types
// ============================================================================

/// Errors produced while deriving or decoding a credential hash.
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// The operating system CSPRNG could not supply a salt.
    #[error("Secure random source unavailable")]
    RandomSource,

    /// The encoded hash does not follow the expected layout.
    #[error("Malformed hash: {message}")]
    MalformedHash {
        /// Which part of the encoding was rejected.
        message: String,
    },

    /// The encoded hash names an algorithm this module does not implement.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// The algorithm tag found in the hash.
        algorithm: String,
    },

    /// The configured cost parameters are rejected by Argon2.
    #[error("Invalid hash parameters: {message}")]
    InvalidParams {
        /// Description of the invalid parameter.
        message: String,
    },

    /// The blocking worker failed.
    #[error("Password hashing failed: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl PasswordError {
    /// Creates a new `MalformedHash` error.
    #[must_use]
    pub fn malformed_hash(message: impl Into<String>) -> Self {
        Self::MalformedHash {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// Creates a new `InvalidParams` error.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the stored hash itself could not be decoded.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedHash { .. } | Self::UnsupportedAlgorithm { .. }
        )
    }

    pub(crate) fn reason(&self) -> &'static str {
        match self {
            Self::RandomSource => "random_source",
            Self::MalformedHash { .. } => "malformed_hash",
            Self::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            Self::InvalidParams { .. } => "invalid_hash_params",
            Self::Internal { .. } => "hash_worker",
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Argon2id cost parameters.
///
/// ```toml
/// [auth.password_hash]
/// memory_kib = 65536
/// time_cost = 2
/// parallelism = 1
/// salt_length = 16
/// key_length = 32
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordHashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of iterations.
    pub time_cost: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
    /// Salt length in bytes.
    pub salt_length: usize,
    /// Derived key length in bytes.
    pub key_length: usize,
}

impl Default for PasswordHashParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536,
            time_cost: 2,
            parallelism: 1,
            salt_length: 16,
            key_length: 32,
        }
    }
}

impl PasswordHashParams {
    /// Checks that every parameter is positive and accepted by Argon2.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` describing the first rejected value.
    pub fn validate(&self) -> Result<(), PasswordError> {
        if self.memory_kib == 0
            || self.time_cost == 0
            || self.parallelism == 0
            || self.salt_length == 0
            || self.key_length == 0
        {
            return Err(PasswordError::invalid_params(
                "all hash parameters must be positive",
            ));
        }
        if self.salt_length < argon2::MIN_SALT_LEN {
            return Err(PasswordError::invalid_params(format!(
                "salt_length must be at least {}",
                argon2::MIN_SALT_LEN
            )));
        }
        self.argon2().map(|_| ())
    }

    fn argon2(&self) -> Result<Argon2<'static>, PasswordError> {
        let params = Params::new(
            self.memory_kib,
            self.time_cost,
            self.parallelism,
            Some(self.key_length),
        )
        .map_err(|e| PasswordError::invalid_params(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn cost_matches(&self, other: &Self) -> bool {
        self == other
    }
}

// ============================================================================
// Encoded Hash
// ============================================================================

/// A decoded credential hash record.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedHash {
    /// Parameters recorded at hashing time. `salt_length` and `key_length`
    /// reflect the decoded byte lengths.
    pub params: PasswordHashParams,
    /// Raw salt bytes.
    pub salt: Vec<u8>,
    /// Raw derived key bytes.
    pub key: Vec<u8>,
}

impl fmt::Debug for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedHash")
            .field("params", &self.params)
            .field("salt", &"[redacted]")
            .field("key", &"[redacted]")
            .finish()
    }
}

impl fmt::Display for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${ALGORITHM_TAG}$v={ALGORITHM_VERSION}$m={},t={},p={}${}${}",
            self.params.memory_kib,
            self.params.time_cost,
            self.params.parallelism,
            STANDARD_NO_PAD.encode(&self.salt),
            STANDARD_NO_PAD.encode(&self.key),
        )
    }
}

/// Decodes an encoded hash string into its parameters, salt and key.
///
/// # Errors
///
/// - `MalformedHash` if the string does not split into exactly six
///   `$`-delimited fields, or a version, cost, salt or key field fails to
///   decode.
/// - `UnsupportedAlgorithm` if the tag is not `argon2id`.
pub fn parse_encoded_hash(encoded: &str) -> Result<EncodedHash, PasswordError> {
    let fields: Vec<&str> = encoded.split('$').collect();
    if fields.len() != FIELD_COUNT {
        return Err(PasswordError::malformed_hash(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        )));
    }
    if !fields[0].is_empty() {
        return Err(PasswordError::malformed_hash("hash must start with '$'"));
    }
    if fields[1] != ALGORITHM_TAG {
        return Err(PasswordError::unsupported_algorithm(fields[1]));
    }

    let version = fields[2]
        .strip_prefix("v=")
        .and_then(|v| v.parse::<u32>().ok())
        .ok_or_else(|| PasswordError::malformed_hash("invalid version field"))?;
    if version != ALGORITHM_VERSION {
        return Err(PasswordError::malformed_hash(format!(
            "unsupported version {version}"
        )));
    }

    let (memory_kib, time_cost, parallelism) = parse_costs(fields[3])?;

    let salt = STANDARD_NO_PAD
        .decode(fields[4])
        .map_err(|e| PasswordError::malformed_hash(format!("salt: {e}")))?;
    let key = STANDARD_NO_PAD
        .decode(fields[5])
        .map_err(|e| PasswordError::malformed_hash(format!("key: {e}")))?;
    if salt.is_empty() || key.is_empty() {
        return Err(PasswordError::malformed_hash("empty salt or key"));
    }

    Ok(EncodedHash {
        params: PasswordHashParams {
            memory_kib,
            time_cost,
            parallelism,
            salt_length: salt.len(),
            key_length: key.len(),
        },
        salt,
        key,
    })
}

fn parse_costs(field: &str) -> Result<(u32, u32, u32), PasswordError> {
    let mut parts = field.split(',');
    let mut next = |name: &str| -> Result<u32, PasswordError> {
        parts
            .next()
            .and_then(|p| p.strip_prefix(name))
            .and_then(|p| p.strip_prefix('='))
            .and_then(|p| p.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| PasswordError::malformed_hash(format!("invalid cost parameter {name}")))
    };
    let costs = (next("m")?, next("t")?, next("p")?);
    if parts.next().is_some() {
        return Err(PasswordError::malformed_hash("unexpected cost parameter"));
    }
    Ok(costs)
}

// ============================================================================
// Hash / Verify
// ============================================================================

/// Hashes a password with a fresh random salt.
///
/// # Errors
///
/// - `InvalidParams` if the parameters are rejected.
/// - `RandomSource` if the OS CSPRNG fails.
pub fn hash_password_with(
    password: &str,
    params: &PasswordHashParams,
) -> Result<String, PasswordError> {
    params.validate()?;

    let mut salt = vec![0u8; params.salt_length];
    OsRng.try_fill_bytes(&mut salt).map_err(|e| {
        tracing::error!(error = %e, "OS random source failed while generating salt");
        PasswordError::RandomSource
    })?;

    let key = derive_key(password, params, &salt)?;
    Ok(EncodedHash {
        params: params.clone(),
        salt,
        key,
    }
    .to_string())
}

/// Verifies a password against an encoded hash.
///
/// Uses the parameters recorded in `encoded`, not the current defaults.
///
/// # Errors
///
/// Returns `MalformedHash` or `UnsupportedAlgorithm` if `encoded` cannot be
/// decoded. A wrong password is `Ok(false)`, never an error.
pub fn verify_password(password: &str, encoded: &str) -> Result<bool, PasswordError> {
    let stored = parse_encoded_hash(encoded)?;
    let candidate = derive_key(password, &stored.params, &stored.salt).map_err(|e| match e {
        PasswordError::InvalidParams { message } => PasswordError::malformed_hash(message),
        other => other,
    })?;
    Ok(constant_time_eq(&candidate, &stored.key))
}

fn derive_key(
    password: &str,
    params: &PasswordHashParams,
    salt: &[u8],
) -> Result<Vec<u8>, PasswordError> {
    let mut key = vec![0u8; params.key_length];
    params
        .argon2()?
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| PasswordError::invalid_params(e.to_string()))?;
    Ok(key)
}

/// Compares two byte slices without short-circuiting on the first mismatch.
///
/// Lengths are not secret: the candidate is always derived at the stored
/// key length, so a length mismatch only happens for corrupt input.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut equal = Choice::from(1u8);
    for (x, y) in a.iter().zip(b) {
        probe::visit();
        equal &= x.ct_eq(y);
    }
    equal.into()
}

#[cfg(not(test))]
mod probe {
    #[inline(always)]
    pub(super) fn visit() {}
}


// ============================================================================
// Async Hasher
// ============================================================================

/// Password hashing service for async callers.
///
/// Each derivation runs on tokio's blocking pool; at most
/// `max_concurrent` derivations run at once so login storms cannot exhaust
/// memory (each one allocates `memory_kib`).
#[derive(Clone)]
pub struct PasswordHasher {
    params: PasswordHashParams,
    permits: Arc<Semaphore>,
}

impl fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("params", &self.params)
            .field("available_slots", &self.permits.available_permits())
            .finish()
    }
}

impl PasswordHasher {
    /// Creates a hasher with the given parameters and worker slot count.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParams` if the parameters are rejected or
    /// `max_concurrent` is zero.
    pub fn new(params: PasswordHashParams, max_concurrent: usize) -> Result<Self, PasswordError> {
        params.validate()?;
        if max_concurrent == 0 {
            return Err(PasswordError::invalid_params(
                "max_concurrent must be positive",
            ));
        }
        Ok(Self {
            params,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        })
    }

    /// Returns the parameters used for new hashes.
    #[must_use]
    pub fn params(&self) -> &PasswordHashParams {
        &self.params
    }

    /// Hashes a password with the configured parameters.
    ///
    /// # Errors
    ///
    /// See [`hash_password_with`].
    pub async fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let params = self.params.clone();
        let password = password.to_owned();
        self.run_blocking(move || hash_password_with(&password, &params))
            .await
    }

    /// Verifies a password against an encoded hash.
    ///
    /// # Errors
    ///
    /// See [`verify_password`].
    pub async fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let password = password.to_owned();
        let encoded = encoded.to_owned();
        self.run_blocking(move || verify_password(&password, &encoded))
            .await
    }

    /// Spends one derivation's worth of work without a stored hash.
    ///
    /// Used when the account does not exist so the response time does not
    /// reveal whether an email is registered.
    pub async fn burn(&self, password: &str) {
        let params = self.params.clone();
        let password = password.to_owned();
        let _ = self
            .run_blocking(move || {
                let salt = vec![0u8; params.salt_length];
                derive_key(&password, &params, &salt).map(|_| ())
            })
            .await;
    }

    /// Returns `true` if `encoded` was produced with different parameters
    /// than the ones currently configured.
    #[must_use]
    pub fn needs_rehash(&self, encoded: &str) -> bool {
        match parse_encoded_hash(encoded) {
            Ok(stored) => !stored.params.cost_matches(&self.params),
            Err(_) => true,
        }
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, PasswordError>
    where
        F: FnOnce() -> Result<T, PasswordError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PasswordError::internal("hash worker pool closed"))?;

        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| PasswordError::internal(format!("hash worker panicked: {e}")))?
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_params() -> PasswordHashParams {
        PasswordHashParams {
            memory_kib: 256,
            time_cost: 1,
            parallelism: 1,
            salt_length: 16,
            key_length: 32,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let params = fast_params();
        let hash = hash_password_with("secret1", &params).unwrap();

        assert!(verify_password("secret1", &hash).unwrap());
        assert!(!verify_password("secret2", &hash).unwrap());
    }

    #[test]
    fn test_fresh_salt_per_hash() {
        let params = fast_params();
        let hash1 = hash_password_with("secret1", &params).unwrap();
        let hash2 = hash_password_with("secret1", &params).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("secret1", &hash1).unwrap());
        assert!(verify_password("secret1", &hash2).unwrap());
    }

    #[test]
    fn test_default_encoding_layout() {
        let hash = hash_password_with("secret1", &PasswordHashParams::default()).unwrap();

        assert!(hash.starts_with("$argon2id$v=19$m=65536,t=2,p=1$"));
        let fields: Vec<&str> = hash.split('$').collect();
        assert_eq!(fields.len(), 6);
        assert!(!fields[4].ends_with('='));
        assert!(!fields[5].ends_with('='));

        let parsed = parse_encoded_hash(&hash).unwrap();
        assert_eq!(parsed.salt.len(), 16);
        assert_eq!(parsed.key.len(), 32);
        assert_eq!(parsed.to_string(), hash);
    }

    #[test]
    fn test_verify_uses_recorded_params() {
        let old = fast_params();
        let hash = hash_password_with("secret1", &old).unwrap();

        // Defaults changing must not break stored hashes.
        let parsed = parse_encoded_hash(&hash).unwrap();
        assert_eq!(parsed.params.memory_kib, 256);
        assert_eq!(parsed.params.time_cost, 1);
        assert!(verify_password("secret1", &hash).unwrap());
    }

    #[test]
    fn test_wrong_field_count_is_malformed() {
        let err = verify_password("secret1", "$argon2id$v=19$m=256,t=1,p=1$abc").unwrap_err();
        assert!(matches!(err, PasswordError::MalformedHash { .. }));

        let err = verify_password("secret1", "not a hash").unwrap_err();
        assert!(matches!(err, PasswordError::MalformedHash { .. }));
    }

    #[test]
    fn test_unsupported_algorithm() {
        let hash = hash_password_with("secret1", &fast_params()).unwrap();
        let swapped = hash.replacen("argon2id", "argon2i", 1);

        let err = verify_password("secret1", &swapped).unwrap_err();
        assert!(matches!(
            err,
            PasswordError::UnsupportedAlgorithm { ref algorithm } if algorithm == "argon2i"
        ));
    }

    #[test]
    fn test_undecodable_segments_are_malformed() {
        let hash = hash_password_with("secret1", &fast_params()).unwrap();
        let fields: Vec<&str> = hash.split('$').collect();

        let bad_salt = format!("${}${}${}$!!!!${}", fields[1], fields[2], fields[3], fields[5]);
        assert!(matches!(
            verify_password("secret1", &bad_salt).unwrap_err(),
            PasswordError::MalformedHash { .. }
        ));

        let bad_key = format!("${}${}${}${}$@@", fields[1], fields[2], fields[3], fields[4]);
        assert!(matches!(
            verify_password("secret1", &bad_key).unwrap_err(),
            PasswordError::MalformedHash { .. }
        ));

        let bad_costs = format!("${}${}$m=x,t=1,p=1${}${}", fields[1], fields[2], fields[4], fields[5]);
        assert!(matches!(
            verify_password("secret1", &bad_costs).unwrap_err(),
            PasswordError::MalformedHash { .. }
        ));

        let bad_version = format!("${}$v=16${}${}${}", fields[1], fields[3], fields[4], fields[5]);
        assert!(matches!(
            verify_password("secret1", &bad_version).unwrap_err(),
            PasswordError::MalformedHash { .. }
        ));
    }

    #[test]
    fn test_truncated_key_never_matches() {
        let hash = hash_password_with("secret1", &fast_params()).unwrap();
        let mut parsed = parse_encoded_hash(&hash).unwrap();
        parsed.key.truncate(8);
        parsed.params.key_length = 8;

        // The output length feeds into Argon2, so a prefix never matches.
        let truncated = parsed.to_string();
        assert!(!verify_password("secret1", &truncated).unwrap());
        assert!(!verify_password("wrong", &truncated).unwrap());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = fast_params();
        params.time_cost = 0;
        assert!(matches!(
            hash_password_with("secret1", &params).unwrap_err(),
            PasswordError::InvalidParams { .. }
        ));

        let mut params = fast_params();
        params.salt_length = 4;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_minimum_salt_length_boundary() {
        let mut params = fast_params();
        params.salt_length = argon2::MIN_SALT_LEN;
        assert!(params.validate().is_ok());

        params.salt_length = argon2::MIN_SALT_LEN - 1;
        let err = params.validate().unwrap_err();
        assert!(err.to_string().contains("salt_length must be at least 8"));
    }

    #[test]
    fn test_comparison_visits_every_byte() {
        let stored = [0xAAu8; 32];

        let mut first = stored;
        first[0] ^= 0xFF;
        probe::take();
        assert!(!constant_time_eq(&first, &stored));
        let visits_first = probe::take();

        let mut last = stored;
        last[31] ^= 0xFF;
        assert!(!constant_time_eq(&last, &stored));
        let visits_last = probe::take();

        assert!(constant_time_eq(&stored, &stored));
        let visits_equal = probe::take();

        assert_eq!(visits_first, 32);
        assert_eq!(visits_last, 32);
        assert_eq!(visits_equal, 32);
    }

    #[test]
    fn test_length_mismatch_is_not_equal() {
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2]));
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let hash = hash_password_with("secret1", &fast_params()).unwrap();
        let parsed = parse_encoded_hash(&hash).unwrap();
        let debug = format!("{parsed:?}");
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains(&STANDARD_NO_PAD.encode(&parsed.key)));
    }

    #[tokio::test]
    async fn test_async_hasher() {
        let hasher = PasswordHasher::new(fast_params(), 2).unwrap();

        let hash = hasher.hash("secret1").await.unwrap();
        assert!(hasher.verify("secret1", &hash).await.unwrap());
        assert!(!hasher.verify("secret2", &hash).await.unwrap());
        assert!(!hasher.needs_rehash(&hash));

        let stronger = PasswordHasher::new(
            PasswordHashParams {
                time_cost: 2,
                ..fast_params()
            },
            1,
        )
        .unwrap();
        assert!(stronger.needs_rehash(&hash));
    }

    #[tokio::test]
    async fn test_async_hasher_concurrent_calls() {
        let hasher = PasswordHasher::new(fast_params(), 1).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let hasher = hasher.clone();
                tokio::spawn(async move { hasher.hash(&format!("secret{i}")).await })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let hash = handle.await.unwrap().unwrap();
            assert!(verify_password(&format!("secret{i}"), &hash).unwrap());
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(PasswordHasher::new(fast_params(), 0).is_err());
    }
}
