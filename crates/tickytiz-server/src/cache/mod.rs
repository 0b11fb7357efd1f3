//! Cache-aside caching of read-heavy listings.
//!
//! ## Architecture
//!
//! ```text
//! GET request → CacheFacade::read → hit: return
//!                                 → miss: backing store → CacheFacade::write
//! write path  → backing store → CacheFacade::invalidate(keys::*_write_keys)
//! ```
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable, reads miss and writes are dropped; results stay
//! correct, only slower. Entries carry a short TTL as a backstop against a
//! missed invalidation.

pub mod backend;
pub mod facade;
pub mod keys;

pub use backend::{CacheBackend, CacheError, CacheStats, CachedEntry};
pub use facade::{CacheFacade, CacheLookup};
