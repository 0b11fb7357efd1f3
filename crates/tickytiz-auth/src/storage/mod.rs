//! Storage traits for authentication data.
//!
//! This module defines storage interfaces for:
//!
//! - Revoked bearer tokens (logout)
//! - Login accounts
//!
//! In-memory implementations live alongside each trait. The Redis-backed
//! revocation store is provided by `tickytiz-server`, the PostgreSQL account
//! store by `tickytiz-auth-postgres`.

pub mod account;
pub mod revoked_token;

pub use account::{AccountStorage, InMemoryAccountStorage};
pub use revoked_token::{InMemoryRevokedTokenStorage, RevokedTokenStorage, revocation_key};
