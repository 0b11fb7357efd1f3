//! Cache backend: in-process DashMap or shared Redis.

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Errors from a cache backend call.
///
/// Callers never surface these to clients; they degrade to a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
}

/// A cached entry with TTL support.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Where cached payloads live.
///
/// ## Cache Modes
///
/// - **Local**: single instance, entries in a DashMap
/// - **Redis**: entries shared by every instance; there is no local tier in
///   front of Redis, so an invalidation is visible everywhere at once
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(Arc<DashMap<String, CachedEntry>>),

    /// Multi-instance: Redis, every call bounded by `timeout`
    Redis { pool: Pool, timeout: Duration },
}

impl std::fmt::Debug for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Local(map) => f
                .debug_struct("Local")
                .field("entries", &map.len())
                .finish(),
            CacheBackend::Redis { timeout, .. } => f
                .debug_struct("Redis")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
        }
    }
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(pool: Pool, timeout: Duration) -> Self {
        CacheBackend::Redis { pool, timeout }
    }

    /// Short name used in logs and metric labels.
    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis { .. } => "redis",
        }
    }

    /// Get a raw payload.
    ///
    /// `Ok(None)` is a miss; expired local entries are removed on the way.
    pub async fn get(&self, key: &str) -> Result<Option<Arc<Vec<u8>>>, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                if let Some(entry) = map.get(key) {
                    if !entry.is_expired() {
                        return Ok(Some(Arc::clone(&entry.data)));
                    }
                    drop(entry);
                    map.remove_if(key, |_, entry| entry.is_expired());
                }
                Ok(None)
            }
            CacheBackend::Redis { pool, timeout } => {
                with_timeout(*timeout, async {
                    let mut conn = pool.get().await?;
                    let data: Option<Vec<u8>> = conn.get(key).await?;
                    Ok::<_, CacheError>(data.map(Arc::new))
                })
                .await
            }
        }
    }

    /// Store a payload, replacing any existing entry under `key`.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis { pool, timeout } => {
                // Sub-second TTLs would round to zero with EX.
                let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
                with_timeout(*timeout, async {
                    let mut conn = pool.get().await?;
                    let _: () = redis::cmd("SET")
                        .arg(key)
                        .arg(value)
                        .arg("PX")
                        .arg(ttl_ms)
                        .query_async(&mut conn)
                        .await?;
                    Ok::<_, CacheError>(())
                })
                .await
            }
        }
    }

    /// Delete every listed key.
    pub async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        match self {
            CacheBackend::Local(map) => {
                for key in keys {
                    map.remove(key);
                }
                Ok(())
            }
            CacheBackend::Redis { pool, timeout } => {
                with_timeout(*timeout, async {
                    let mut conn = pool.get().await?;
                    let _: () = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
                    Ok::<_, CacheError>(())
                })
                .await
            }
        }
    }

    /// Drop expired local entries. No-op for Redis, which expires keys itself.
    pub fn purge_expired(&self) -> usize {
        match self {
            CacheBackend::Local(map) => purge_map(map),
            CacheBackend::Redis { .. } => 0,
        }
    }

    /// Sweep expired local entries every `interval` on a background task.
    ///
    /// Entries are otherwise only dropped when their own key is read again.
    /// The task holds a weak reference and ends once every clone of the
    /// backend is gone. Returns `None` for Redis.
    pub fn spawn_purge_task(&self, interval: Duration) -> Option<JoinHandle<()>> {
        let CacheBackend::Local(map) = self else {
            return None;
        };
        let map = Arc::downgrade(map);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(map) = map.upgrade() else {
                    break;
                };
                let purged = purge_map(&map);
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired cache entries");
                }
            }
        }))
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        match self {
            CacheBackend::Local(map) => CacheStats {
                local_entries: map.len(),
                mode: self.mode(),
            },
            CacheBackend::Redis { .. } => CacheStats {
                local_entries: 0,
                mode: self.mode(),
            },
        }
    }

    /// Check if Redis is available (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis { pool, timeout } => {
                with_timeout(*timeout, async { Ok::<_, CacheError>(pool.get().await?) })
                    .await
                    .is_ok()
            }
        }
    }
}

fn purge_map(map: &DashMap<String, CachedEntry>) -> usize {
    let before = map.len();
    map.retain(|_, entry| !entry.is_expired());
    before.saturating_sub(map.len())
}

async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| CacheError::Timeout(timeout))?
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub local_entries: usize,
    pub mode: &'static str,
}
