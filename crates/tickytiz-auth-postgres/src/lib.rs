//! PostgreSQL storage backend for Tickytiz accounts.
//!
//! Provides persistent storage for login accounts (`account` table) and the
//! matching profile rows (`users` table) created at registration.
//!
//! # Example
//!
//! ```ignore
//! use tickytiz_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/tickytiz", 10).await?;
//! storage.migrate().await?;
//! let accounts = storage.account_storage();
//! ```

pub mod account;
pub mod migrations;
pub mod storage_adapters;

use std::sync::Arc;
use std::time::Duration;

use sqlx_core::pool::{Pool, PoolOptions};
use sqlx_postgres::Postgres;

use tickytiz_auth::AuthError;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use account::{AccountRow, AccountStorage};
pub use storage_adapters::ArcAccountStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during account storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Resource already exists (conflict).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored value could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Returns `true` if the database could not be reached at all.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Database(
                sqlx_core::Error::PoolTimedOut
                    | sqlx_core::Error::PoolClosed
                    | sqlx_core::Error::Io(_)
                    | sqlx_core::Error::Tls(_)
            )
        )
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(message) => AuthError::conflict(message),
            StorageError::NotFound(message) => AuthError::unauthorized(message),
            other if other.is_unavailable() => AuthError::store_unavailable(other.to_string()),
            other => AuthError::internal(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for account data.
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PoolOptions::<Postgres>::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Account storage usable as `Arc<dyn tickytiz_auth::AccountStorage>`.
    #[must_use]
    pub fn account_storage(&self) -> ArcAccountStorage {
        ArcAccountStorage::new(Arc::clone(&self.pool))
    }
}
