//! Login account storage trait.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::{Account, Role};

/// Storage for login accounts and their password hashes.
///
/// Only encoded hashes cross this boundary; plaintext passwords never reach
/// storage.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Creates an account with role `user` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the email is already registered.
    async fn create_account(&self, email: &str, password_hash: &str) -> AuthResult<i64>;

    /// Looks up an account by login email.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>>;

    /// Returns the stored password hash for an account.
    async fn password_hash(&self, account_id: i64) -> AuthResult<Option<String>>;

    /// Replaces the stored password hash.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` if the account no longer exists.
    async fn update_password(&self, account_id: i64, password_hash: &str) -> AuthResult<()>;
}

/// In-memory account store.
#[derive(Debug)]
pub struct InMemoryAccountStorage {
    accounts: DashMap<i64, Account>,
    by_email: DashMap<String, i64>,
    next_id: AtomicI64,
}

impl Default for InMemoryAccountStorage {
    fn default() -> Self {
        Self {
            accounts: DashMap::new(),
            by_email: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl InMemoryAccountStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an account with an explicit role.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the email is already registered.
    pub fn insert(&self, email: &str, password_hash: &str, role: Role) -> AuthResult<i64> {
        match self.by_email.entry(email.to_string()) {
            Entry::Occupied(_) => Err(AuthError::conflict("email already registered")),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.accounts.insert(
                    id,
                    Account {
                        id,
                        email: email.to_string(),
                        role,
                        password_hash: password_hash.to_string(),
                    },
                );
                slot.insert(id);
                Ok(id)
            }
        }
    }
}

#[async_trait]
impl AccountStorage for InMemoryAccountStorage {
    async fn create_account(&self, email: &str, password_hash: &str) -> AuthResult<i64> {
        self.insert(email, password_hash, Role::User)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<Account>> {
        let Some(id) = self.by_email.get(email).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn password_hash(&self, account_id: i64) -> AuthResult<Option<String>> {
        Ok(self
            .accounts
            .get(&account_id)
            .map(|a| a.password_hash.clone()))
    }

    async fn update_password(&self, account_id: i64, password_hash: &str) -> AuthResult<()> {
        match self.accounts.get_mut(&account_id) {
            Some(mut account) => {
                account.password_hash = password_hash.to_string();
                Ok(())
            }
            None => Err(AuthError::unauthorized("account not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find() {
        let store = InMemoryAccountStorage::new();
        let id = store.create_account("a@x.com", "hash").await.unwrap();

        let account = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(account.id, id);
        assert_eq!(account.role, Role::User);
        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = InMemoryAccountStorage::new();
        store.create_account("a@x.com", "hash").await.unwrap();

        let err = store.create_account("a@x.com", "other").await.unwrap_err();
        assert!(matches!(err, AuthError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_update_password() {
        let store = InMemoryAccountStorage::new();
        let id = store.create_account("a@x.com", "old").await.unwrap();

        store.update_password(id, "new").await.unwrap();
        assert_eq!(store.password_hash(id).await.unwrap().as_deref(), Some("new"));
        assert!(store.update_password(999, "x").await.is_err());
    }
}
