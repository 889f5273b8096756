//! # KvBridge Smoke
//!
//! Connects to the cache described by `CACHE_*` and runs one set/get/expire round.

use std::process::ExitCode;

use kvbridge_core::CacheError;
use kvbridge_infra::{RedisConfig, new_cache};

mod scenario;
mod telemetry;

use telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    // Configuration is mandatory; a bad environment stops the process here
    let config = match RedisConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid cache configuration");
            return Ok(ExitCode::FAILURE);
        }
    };

    tracing::info!(?config, "Connecting to cache");

    let (cache, cleanup) = match new_cache(config).await {
        Ok(pair) => pair,
        Err(e @ CacheError::Connection(_)) => {
            tracing::error!(error = %e, "Cache unreachable");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e.into()),
    };

    let key = std::env::var("SMOKE_KEY").unwrap_or_else(|_| "kvbridge:smoke".to_string());
    let outcome = scenario::run(cache.as_ref(), &key).await;

    cleanup.run();
    outcome?;

    Ok(ExitCode::SUCCESS)
}
