pub mod cache;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod revocation;
pub mod server;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tickytiz_auth::{InMemoryRevokedTokenStorage, RevokedTokenStorage};

pub use cache::{CacheBackend, CacheFacade, CacheLookup};
pub use config::{AppConfig, CacheConfig, PostgresStorageConfig, RedisConfig, ServerConfig};
pub use observability::init_tracing;
pub use revocation::RedisRevokedTokenStorage;
pub use server::{AppState, TickytizServer, build_router};

const REVOCATION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Create a Redis connection pool and check that a connection can be made.
///
/// Returns `None` when Redis is disabled or unreachable.
pub async fn create_redis_pool(config: &RedisConfig) -> Option<deadpool_redis::Pool> {
    if !config.enabled {
        tracing::info!("Redis disabled");
        return None;
    }

    tracing::info!("Connecting to Redis");

    let timeout = config.timeout();
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool");
            return None;
        }
    };

    // Test connection
    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            Some(pool)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis");
            None
        }
    }
}

/// Create a cache backend.
///
/// ## Graceful Degradation
///
/// Without a Redis pool the cache is local to this instance, and a
/// background task sweeps expired entries every `cache.purge_interval`. The
/// server starts and runs either way.
pub fn create_cache_backend(
    pool: Option<&deadpool_redis::Pool>,
    redis: &RedisConfig,
    cache: &CacheConfig,
) -> CacheBackend {
    match pool {
        Some(pool) => CacheBackend::new_redis(pool.clone(), redis.timeout()),
        None => {
            if redis.enabled {
                tracing::warn!("Redis unavailable, falling back to local cache");
            }
            let backend = CacheBackend::new_local();
            backend.spawn_purge_task(cache.purge_interval);
            backend
        }
    }
}

/// Create the revocation store.
///
/// Unlike the cache there is no silent fallback: a local revocation list is
/// not shared, so a token logged out on one instance would stay valid on the
/// others. When Redis is enabled but unreachable this fails unless
/// `redis.required_for_revocation` is turned off.
pub fn create_revocation_store(
    pool: Option<&deadpool_redis::Pool>,
    config: &AppConfig,
) -> anyhow::Result<Arc<dyn RevokedTokenStorage>> {
    match pool {
        Some(pool) => Ok(Arc::new(
            RedisRevokedTokenStorage::new(pool.clone()).with_key_prefix(&config.cache.key_prefix),
        )),
        None if config.redis.enabled && config.redis.required_for_revocation => {
            anyhow::bail!("Redis is enabled but unreachable; refusing to keep revoked tokens in process memory")
        }
        None => {
            if config.redis.enabled {
                tracing::warn!("Redis unavailable, revoked tokens are kept in process memory");
            }
            let store = Arc::new(InMemoryRevokedTokenStorage::new());
            spawn_revocation_purge(Arc::downgrade(&store));
            Ok(store as Arc<dyn RevokedTokenStorage>)
        }
    }
}

/// Periodically drops expired in-process revocation entries. Stops once the
/// store is dropped.
fn spawn_revocation_purge(store: Weak<InMemoryRevokedTokenStorage>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REVOCATION_PURGE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(store) = store.upgrade() else {
                break;
            };
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired revocation entries");
            }
        }
    });
}
