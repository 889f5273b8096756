//! # KvBridge Infrastructure
//!
//! Concrete implementations of the `Cache` port defined in `kvbridge-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis backend, single node or cluster

pub mod cache;

// Re-exports - In-Memory
pub use cache::{InMemoryCache, RedisConfig};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use cache::{RedisCache, new_cache, new_cache_from_env};
