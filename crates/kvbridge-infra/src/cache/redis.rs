//! Redis cache implementation - the production facade.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisError};

use kvbridge_core::{Cache, CacheError, Context, Ttl};

use super::config::RedisConfig;
use super::connection::{self, Connection};

/// Redis-backed cache.
///
/// Holds the connection until [`RedisCache::close`] releases it; after that
/// every operation fails with [`CacheError::Closed`].
pub struct RedisCache {
    conn: RwLock<Option<Connection>>,
    config: RedisConfig,
}

impl RedisCache {
    /// Connect and health-check within `config.connect_timeout`.
    pub async fn connect(config: RedisConfig) -> Result<Self, CacheError> {
        let timeout = config.connect_timeout;
        let conn = tokio::time::timeout(timeout, connection::open(&config))
            .await
            .map_err(|_| {
                CacheError::Connection(format!("Connection timed out after {timeout:?}"))
            })??;

        tracing::info!(
            addrs = ?config.addrs,
            cluster = config.is_cluster(),
            db = config.db,
            "Connected to Redis cache"
        );

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            config,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, CacheError> {
        Self::connect(RedisConfig::from_env()?).await
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Release the connection. Returns false if it was already released.
    pub fn close(&self) -> bool {
        let released = self
            .conn
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();

        if released {
            tracing::info!(addrs = ?self.config.addrs, "Redis cache connection closed");
        }
        released
    }

    pub fn is_closed(&self) -> bool {
        self.conn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn connection(&self) -> Result<Connection, CacheError> {
        self.conn
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(CacheError::Closed)
    }
}

/// How a `SET` expiration goes on the wire.
#[derive(Debug, PartialEq, Eq)]
enum Expiry {
    None,
    Seconds(u64),
    Millis(u64),
}

impl Expiry {
    fn from_duration(exp: Duration) -> Self {
        if exp.is_zero() {
            return Self::None;
        }
        if exp.subsec_nanos() == 0 {
            return Self::Seconds(exp.as_secs());
        }

        let millis = u64::try_from(exp.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            tracing::warn!(
                ?exp,
                "Expiration below the 1ms server minimum; using 1ms"
            );
            return Self::Millis(1);
        }
        Self::Millis(millis)
    }
}

fn command_failed(command: &'static str, key: &str, err: RedisError) -> CacheError {
    tracing::debug!(command, key = %key, error = %err, "Redis command failed");
    CacheError::operation(err)
}

#[async_trait]
impl Cache for RedisCache {
    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        exp: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.connection()?;

        ctx.run(async move {
            let reply = match Expiry::from_duration(exp) {
                Expiry::None => conn.set::<_, _, ()>(key, value).await,
                Expiry::Seconds(secs) => conn.set_ex::<_, _, ()>(key, value, secs).await,
                Expiry::Millis(millis) => conn.pset_ex::<_, _, ()>(key, value, millis).await,
            };
            reply.map_err(|e| command_failed("SET", key, e))
        })
        .await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<String, CacheError> {
        let mut conn = self.connection()?;

        ctx.run(async move {
            conn.get::<_, Option<String>>(key)
                .await
                .map_err(|e| command_failed("GET", key, e))?
                .ok_or(CacheError::NotFound)
        })
        .await
    }

    async fn del(&self, ctx: &Context, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection()?;

        ctx.run(async move {
            conn.del::<_, ()>(key)
                .await
                .map_err(|e| command_failed("DEL", key, e))
        })
        .await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection()?;

        ctx.run(async move {
            conn.exists::<_, bool>(key)
                .await
                .map_err(|e| command_failed("EXISTS", key, e))
        })
        .await
    }

    async fn ttl(&self, ctx: &Context, key: &str) -> Result<Ttl, CacheError> {
        let mut conn = self.connection()?;

        ctx.run(async move {
            conn.ttl::<_, i64>(key)
                .await
                .map(Ttl::from_reply)
                .map_err(|e| command_failed("TTL", key, e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn get_test_cache() -> Option<RedisCache> {
        let addrs = std::env::var("CACHE_TEST_ADDRS")
            .unwrap_or_else(|_| "localhost:6389".to_string());
        let mut config = RedisConfig::new(addrs.split(',').map(str::trim));
        config.connect_timeout = Duration::from_secs(1);

        RedisCache::connect(config).await.ok()
    }

    fn unique_key(name: &str) -> String {
        format!("kvbridge_test:{name}:{}", uuid::Uuid::new_v4())
    }

    fn ctx() -> Context {
        Context::background()
    }

    #[test]
    fn test_expiry_encoding() {
        assert_eq!(Expiry::from_duration(Duration::ZERO), Expiry::None);
        assert_eq!(
            Expiry::from_duration(Duration::from_secs(30)),
            Expiry::Seconds(30)
        );
        assert_eq!(
            Expiry::from_duration(Duration::from_millis(1500)),
            Expiry::Millis(1500)
        );
        assert_eq!(
            Expiry::from_duration(Duration::from_millis(250)),
            Expiry::Millis(250)
        );
        assert_eq!(
            Expiry::from_duration(Duration::from_micros(10)),
            Expiry::Millis(1)
        );
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let mut config = RedisConfig::new(["127.0.0.1:1"]);
        config.connect_timeout = Duration::from_secs(1);

        let err = RedisCache::connect(config).await.err().expect("connect should fail");
        assert!(matches!(err, CacheError::Connection(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_server() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let mut config = RedisConfig::new([addr.to_string()]);
        config.connect_timeout = Duration::from_millis(500);

        let started = std::time::Instant::now();
        let err = RedisCache::connect(config).await.err().expect("connect should fail");
        let elapsed = started.elapsed();
        silent.abort();

        match err {
            CacheError::Connection(msg) => assert!(msg.contains("timed out"), "got {msg:?}"),
            other => panic!("expected connection error, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(500), "returned after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "returned after {elapsed:?}");
    }

    #[tokio::test]
    async fn test_redis_cache_set_get() {
        let cache = match get_test_cache().await {
            Some(c) => c,
            None => {
                tracing::warn!("Redis not available, skipping test");
                return;
            }
        };

        let key = unique_key("set_get");

        cache.set(&ctx(), &key, "test_value", Duration::ZERO).await.unwrap();
        assert_eq!(cache.get(&ctx(), &key).await.unwrap(), "test_value");
        assert!(cache.exists(&ctx(), &key).await.unwrap());

        cache.del(&ctx(), &key).await.unwrap();
        assert!(cache.get(&ctx(), &key).await.unwrap_err().is_not_found());
        assert!(!cache.exists(&ctx(), &key).await.unwrap());

        // Idempotent
        cache.del(&ctx(), &key).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_cache_ttl() {
        let cache = match get_test_cache().await {
            Some(c) => c,
            None => return,
        };

        let missing = unique_key("ttl_missing");
        assert_eq!(cache.ttl(&ctx(), &missing).await.unwrap(), Ttl::Missing);

        let forever = unique_key("ttl_forever");
        cache.set(&ctx(), &forever, "v", Duration::ZERO).await.unwrap();
        assert_eq!(cache.ttl(&ctx(), &forever).await.unwrap(), Ttl::Persistent);

        let expiring = unique_key("ttl_expiring");
        let exp = Duration::from_secs(30);
        cache.set(&ctx(), &expiring, "v", exp).await.unwrap();
        let remaining = cache
            .ttl(&ctx(), &expiring)
            .await
            .unwrap()
            .remaining()
            .expect("key should expire");
        assert!(remaining > Duration::ZERO && remaining <= exp);

        cache.del(&ctx(), &forever).await.unwrap();
        cache.del(&ctx(), &expiring).await.unwrap();
    }

    #[tokio::test]
    async fn test_redis_cache_expiration() {
        let cache = match get_test_cache().await {
            Some(c) => c,
            None => return,
        };

        let key = unique_key("expire");

        // Set with 1s TTL
        cache
            .set(&ctx(), &key, "1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(cache.get(&ctx(), &key).await.unwrap(), "1");

        // Wait for expiration
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(cache.get(&ctx(), &key).await.unwrap_err().is_not_found());
        assert!(!cache.exists(&ctx(), &key).await.unwrap());
    }

    #[tokio::test]
    async fn test_redis_cache_context_and_close() {
        let cache = match get_test_cache().await {
            Some(c) => c,
            None => return,
        };

        let key = unique_key("closed");

        let (cancelled, handle) = ctx().with_cancel();
        handle.cancel();
        let err = cache.get(&cancelled, &key).await.unwrap_err();
        assert!(matches!(err, CacheError::Cancelled));

        assert!(cache.close());
        assert!(cache.is_closed());
        assert!(!cache.close());

        let err = cache.set(&ctx(), &key, "v", Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, CacheError::Closed));
    }

    #[tokio::test]
    async fn test_redis_cache_concurrent_callers() {
        let Some(cache) = get_test_cache().await else {
            return;
        };
        let cache: Arc<dyn Cache> = Arc::new(cache);

        let keys: Vec<String> = (0..16).map(|i| unique_key(&format!("conc{i}"))).collect();

        let writes = keys.iter().map(|key| {
            let cache = cache.clone();
            async move {
                cache
                    .set(&ctx(), key, key, Duration::from_secs(30))
                    .await
            }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        for key in &keys {
            assert_eq!(cache.get(&ctx(), key).await.unwrap(), *key);
            cache.del(&ctx(), key).await.unwrap();
        }
    }
}
