//! Cache implementations - Redis and an in-memory double.

mod config;
mod memory;

#[cfg(feature = "redis")]
mod connection;
#[cfg(feature = "redis")]
mod redis;

pub use config::{CONNECT_TIMEOUT, DEFAULT_PREFIX, RedisConfig};
pub use memory::InMemoryCache;

#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

#[cfg(feature = "redis")]
use std::sync::Arc;

#[cfg(feature = "redis")]
use kvbridge_core::{Cache, CacheError, Cleanup};

/// Connect to the configured cache service.
///
/// Returns the facade together with the handle that releases its
/// connection. Run the handle once no operation is in flight any more.
#[cfg(feature = "redis")]
pub async fn new_cache(config: RedisConfig) -> Result<(Arc<dyn Cache>, Cleanup), CacheError> {
    let redis = Arc::new(RedisCache::connect(config).await?);

    let handle = redis.clone();
    let cleanup = Cleanup::new(move || {
        handle.close();
    });

    let cache: Arc<dyn Cache> = redis;
    Ok((cache, cleanup))
}

/// Read `CACHE_*` from the environment, then [`new_cache`].
#[cfg(feature = "redis")]
pub async fn new_cache_from_env() -> Result<(Arc<dyn Cache>, Cleanup), CacheError> {
    new_cache(RedisConfig::from_env()?).await
}
