//! Arc-owning storage adapters for use with the account service.
//!
//! These adapters wrap the lifetime-based storage types and own an
//! `Arc<PgPool>`, allowing them to be used as `Arc<dyn AccountStorage>`.

use std::sync::Arc;

use async_trait::async_trait;

use tickytiz_auth::storage::AccountStorage as AccountStorageTrait;
use tickytiz_auth::types::Account;
use tickytiz_auth::{AuthError, AuthResult};

use crate::PgPool;
use crate::account::AccountStorage;

/// Arc-owning PostgreSQL account storage adapter.
#[derive(Clone)]
pub struct ArcAccountStorage {
    pool: Arc<PgPool>,
}

impl ArcAccountStorage {
    /// Create a new Arc-owning account storage.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStorageTrait for ArcAccountStorage {
    async fn create_account(&self, email: &str, password_hash: &str) -> AuthResult<i64> {
        let storage = AccountStorage::new(&self.pool);
        Ok(storage.create(email, password_hash).await?)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let storage = AccountStorage::new(&self.pool);
        storage
            .find_by_email(email)
            .await?
            .map(|row| row.into_account().map_err(AuthError::from))
            .transpose()
    }

    async fn password_hash(&self, account_id: i64) -> AuthResult<Option<String>> {
        let storage = AccountStorage::new(&self.pool);
        Ok(storage.password_hash(account_id).await?)
    }

    async fn update_password(&self, account_id: i64, password_hash: &str) -> AuthResult<()> {
        let storage = AccountStorage::new(&self.pool);
        Ok(storage.update_password(account_id, password_hash).await?)
    }
}
