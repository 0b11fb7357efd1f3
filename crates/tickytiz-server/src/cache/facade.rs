//! Cache-aside facade over [`CacheBackend`].
//!
//! Payloads are JSON, so a cached empty listing is a hit carrying an empty
//! value and never confused with a miss. Every backend failure degrades to a
//! miss or a dropped write: callers always fall through to the backing store.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use crate::metrics;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    /// A stored payload, possibly an empty one.
    Hit(T),
    /// Nothing usable is stored; compute the value from the backing store.
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }
}

/// Typed cache-aside access with a default TTL and key namespace.
#[derive(Debug, Clone)]
pub struct CacheFacade {
    backend: CacheBackend,
    default_ttl: Duration,
    key_prefix: String,
}

impl CacheFacade {
    pub fn new(backend: CacheBackend, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
            key_prefix: String::new(),
        }
    }

    /// Namespace every key, e.g. `tickytiz:` so `movies:all` is stored as
    /// `tickytiz:movies:all`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Read and decode the payload stored under `key`.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> CacheLookup<T> {
        let storage_key = self.storage_key(key);
        let mode = self.backend.mode();

        let bytes = match self.backend.get(&storage_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key, "cache miss");
                metrics::record_cache_miss(mode);
                return CacheLookup::Miss;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                metrics::record_cache_error("get");
                metrics::record_cache_miss(mode);
                return CacheLookup::Miss;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                metrics::record_cache_hit(mode);
                CacheLookup::Hit(value)
            }
            Err(e) => {
                // Left behind by an older payload shape; drop it so the next
                // write replaces it.
                warn!(key, error = %e, "Undecodable cache payload, discarding");
                metrics::record_cache_error("decode");
                metrics::record_cache_miss(mode);
                if let Err(e) = self.backend.delete(&[storage_key]).await {
                    warn!(key, error = %e, "Failed to discard cache payload");
                }
                CacheLookup::Miss
            }
        }
    }

    /// Store `value` under `key`, overwriting any existing entry.
    ///
    /// `ttl` of `None` uses the configured default. Failures are logged and
    /// otherwise ignored.
    pub async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache payload");
                metrics::record_cache_error("encode");
                return;
            }
        };

        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.backend.set(&self.storage_key(key), payload, ttl).await {
            Ok(()) => debug!(key, ttl_ms = ttl.as_millis() as u64, "cache set"),
            Err(e) => {
                warn!(key, error = %e, "Cache write failed");
                metrics::record_cache_error("set");
            }
        }
    }

    /// Delete every listed key.
    ///
    /// A failed invalidation leaves the stale entry to expire on its TTL.
    pub async fn invalidate(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        let storage_keys: Vec<String> = keys.iter().map(|k| self.storage_key(k)).collect();
        match self.backend.delete(&storage_keys).await {
            Ok(()) => debug!(keys = ?keys, "cache invalidated"),
            Err(e) => {
                warn!(keys = ?keys, error = %e, "Cache invalidation failed");
                metrics::record_cache_error("del");
            }
        }
    }

    /// Read-through helper: return the cached value, or run `loader`,
    /// cache its result and return it.
    ///
    /// Loader errors propagate unchanged and are never cached.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let CacheLookup::Hit(value) = self.read(key).await {
            return Ok(value);
        }
        let value = loader().await?;
        self.write(key, &value, ttl).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn facade() -> CacheFacade {
        CacheFacade::new(CacheBackend::new_local(), Duration::from_secs(600))
            .with_key_prefix("test:")
    }

    #[tokio::test]
    async fn test_write_read_invalidate() {
        let cache = facade();
        let movies = vec!["Dune".to_string(), "Alien".to_string()];

        cache.write(keys::MOVIES_ALL, &movies, None).await;
        assert_eq!(
            cache.read::<Vec<String>>(keys::MOVIES_ALL).await,
            CacheLookup::Hit(movies)
        );

        cache.invalidate(&keys::movie_write_keys()).await;
        assert_eq!(
            cache.read::<Vec<String>>(keys::MOVIES_ALL).await,
            CacheLookup::Miss
        );
    }

    #[tokio::test]
    async fn test_empty_listing_is_hit() {
        let cache = facade();
        cache.write(keys::MOVIES_POPULAR, &Vec::<String>::new(), None).await;

        assert_eq!(
            cache.read::<Vec<String>>(keys::MOVIES_POPULAR).await,
            CacheLookup::Hit(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_discarded() {
        let cache = facade();
        cache.write("user:1:profile", &"not a number", None).await;

        assert_eq!(cache.read::<u64>("user:1:profile").await, CacheLookup::Miss);
        assert_eq!(cache.backend().stats().local_entries, 0);
    }

    #[tokio::test]
    async fn test_keys_are_namespaced() {
        let cache = facade();
        cache.write(keys::MOVIES_ALL, &1u32, None).await;

        let raw = cache.backend().get("test:movies:all").await.unwrap();
        assert!(raw.is_some());
        assert!(cache.backend().get("movies:all").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let cache = facade();
        cache.write("k", &1u32, None).await;
        cache.write("k", &2u32, None).await;
        assert_eq!(cache.read::<u32>("k").await, CacheLookup::Hit(2));
    }

    #[tokio::test]
    async fn test_ttl_expires_entry() {
        let cache = facade();
        cache.write("k", &1u32, Some(Duration::from_millis(20))).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.read::<u32>("k").await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_get_or_load_calls_loader_once() {
        let cache = facade();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Vec<u32>, String> = cache
                .get_or_load("schedule:7", None, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2])
                })
                .await;
            assert_eq!(value.unwrap(), vec![1, 2]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_load_does_not_cache_errors() {
        let cache = facade();

        let first: Result<u32, &str> = cache
            .get_or_load("k", None, || async { Err("db down") })
            .await;
        assert_eq!(first, Err("db down"));

        let second: Result<u32, &str> = cache.get_or_load("k", None, || async { Ok(5) }).await;
        assert_eq!(second, Ok(5));
    }
}
