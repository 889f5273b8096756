//! In-memory cache implementation - a test double with the Redis facade's contract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use kvbridge_core::{Cache, CacheError, Context, Ttl};

struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// In-memory cache using a HashMap behind an async RwLock.
///
/// Mirrors the server's observable behavior: misses are
/// [`CacheError::NotFound`], a zero expiration means no expiration, and TTL
/// replies use the `-1`/`-2` sentinels. Expiry follows the tokio clock so
/// tests can pause time.
/// Note: Data is lost on process restart.
pub struct InMemoryCache {
    store: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let store = self.store.read().await;
        store.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look up `key`, dropping it first if it has expired.
    async fn live<T>(&self, key: &str, read: impl FnOnce(&CacheEntry, Instant) -> T) -> Option<T> {
        let now = Instant::now();
        {
            let store = self.store.read().await;
            match store.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(read(entry, now)),
                Some(_) => {}
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have replaced it
        let mut store = self.store.write().await;
        if store.get(key).is_some_and(|e| e.is_expired(now)) {
            store.remove(key);
        }
        None
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole seconds left, rounded to nearest like the server's `TTL`.
fn remaining_secs(expires_at: Instant, now: Instant) -> Duration {
    let millis = expires_at.saturating_duration_since(now).as_millis();
    let secs = (millis + 500) / 1000;
    Duration::from_secs(u64::try_from(secs).unwrap_or(u64::MAX))
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        exp: Duration,
    ) -> Result<(), CacheError> {
        ctx.run(async {
            let expires_at = if exp.is_zero() {
                None
            } else {
                // Same rejection the server gives for an out-of-range expiration
                let at = Instant::now()
                    .checked_add(exp)
                    .ok_or_else(|| CacheError::operation("invalid expire time in 'set' command"))?;
                Some(at)
            };

            let mut store = self.store.write().await;
            store.insert(
                key.to_string(),
                CacheEntry {
                    value: value.to_string(),
                    expires_at,
                },
            );
            Ok(())
        })
        .await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<String, CacheError> {
        ctx.run(async {
            self.live(key, |entry, _| entry.value.clone())
                .await
                .ok_or(CacheError::NotFound)
        })
        .await
    }

    async fn del(&self, ctx: &Context, key: &str) -> Result<(), CacheError> {
        ctx.run(async {
            let mut store = self.store.write().await;
            store.remove(key);
            Ok(())
        })
        .await
    }

    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, CacheError> {
        ctx.run(async { Ok(self.live(key, |_, _| ()).await.is_some()) })
            .await
    }

    async fn ttl(&self, ctx: &Context, key: &str) -> Result<Ttl, CacheError> {
        ctx.run(async {
            let ttl = self
                .live(key, |entry, now| match entry.expires_at {
                    Some(at) => Ttl::Expires(remaining_secs(at, now)),
                    None => Ttl::Persistent,
                })
                .await
                .unwrap_or(Ttl::Missing);
            Ok(ttl)
        })
        .await
    }
}
