//! Account storage.
//!
//! Login credentials live in `account`; every account also owns a `users`
//! row that the profile endpoints hang off. Both are written in a single
//! transaction at registration.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use tracing::debug;

use tickytiz_auth::types::{Account, Role};

use crate::{PgPool, StorageError, StorageResult};

/// Account record from database.
#[derive(Debug, Clone)]
pub struct AccountRow {
    /// Account id.
    pub id: i64,
    /// Login email.
    pub email: String,
    /// Role stored as text.
    pub role: String,
    /// Encoded password hash.
    pub password: String,
}

impl AccountRow {
    fn from_tuple(row: (i64, String, String, String)) -> Self {
        Self {
            id: row.0,
            email: row.1,
            role: row.2,
            password: row.3,
        }
    }

    /// Converts the row into the account type used by the login flow.
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` if the stored role is unknown.
    pub fn into_account(self) -> StorageResult<Account> {
        let role: Role = self
            .role
            .parse()
            .map_err(|e| StorageError::InvalidData(format!("account {}: {e}", self.id)))?;
        Ok(Account {
            id: self.id,
            email: self.email,
            role,
            password_hash: self.password,
        })
    }
}

/// PostgreSQL account storage.
pub struct AccountStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> AccountStorage<'a> {
    /// Create a new account storage with the given connection pool.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create an account and its profile row.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the email is already registered.
    pub async fn create(&self, email: &str, password_hash: &str) -> StorageResult<i64> {
        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = query_as(
            r#"
            INSERT INTO account (email, password)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx_core::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StorageError::conflict("email already registered");
            }
            StorageError::from(e)
        })?;

        query("INSERT INTO users (id) VALUES ($1)")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(account_id = id, "Account created");
        Ok(id)
    }

    /// Find an account by login email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_email(&self, email: &str) -> StorageResult<Option<AccountRow>> {
        let row: Option<(i64, String, String, String)> = query_as(
            r#"
            SELECT id, email, role, password
            FROM account
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(AccountRow::from_tuple))
    }

    /// Get the stored password hash for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn password_hash(&self, id: i64) -> StorageResult<Option<String>> {
        let row: Option<(String,)> = query_as("SELECT password FROM account WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(|(password,)| password))
    }

    /// Replace the stored password hash.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no account has the given id.
    pub async fn update_password(&self, id: i64, password_hash: &str) -> StorageResult<()> {
        let result = query("UPDATE account SET password = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("account {id}")));
        }
        Ok(())
    }

    /// Set the role of an account. Used when provisioning administrators.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no account has the given id.
    pub async fn set_role(&self, id: i64, role: Role) -> StorageResult<()> {
        let result = query("UPDATE account SET role = $2 WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(format!("account {id}")));
        }
        Ok(())
    }
}
