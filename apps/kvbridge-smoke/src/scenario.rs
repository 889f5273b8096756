//! The smoke round: write a short-lived key, read it back, wait it out.

use std::time::Duration;

use anyhow::{Context as _, bail, ensure};
use kvbridge_core::{Cache, CacheError, Context, Ttl};

/// Per-call bound for each cache round trip.
const CALL_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(cache: &dyn Cache, key: &str) -> anyhow::Result<()> {
    let root = Context::background();
    let call = || root.with_timeout(CALL_TIMEOUT);
    let exp = Duration::from_secs(1);

    cache
        .set(&call(), key, "1", exp)
        .await
        .context("SET failed")?;

    let value = cache.get(&call(), key).await.context("GET failed")?;
    ensure!(value == "1", "GET returned {value:?}, expected \"1\"");

    match cache.ttl(&call(), key).await.context("TTL failed")? {
        Ttl::Expires(left) if left <= exp => {
            tracing::debug!(key, ttl = ?left, "TTL within expiration");
        }
        other => bail!("unexpected TTL reply {other:?}"),
    }

    tokio::time::sleep(exp + Duration::from_millis(500)).await;

    match cache.get(&call(), key).await {
        Err(CacheError::NotFound) => {}
        Ok(value) => bail!("key still present after expiry: {value:?}"),
        Err(e) => return Err(e).context("GET after expiry failed"),
    }

    let present = cache
        .exists(&call(), key)
        .await
        .context("EXISTS failed")?;
    ensure!(!present, "EXISTS reported an expired key");

    cache.del(&call(), key).await.context("DEL failed")?;

    tracing::info!(key, "Smoke round passed");
    Ok(())
}
