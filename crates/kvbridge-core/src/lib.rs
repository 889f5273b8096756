//! # KvBridge Core
//!
//! The port layer of the cache facade.
//! This crate defines what a cache backend must offer and carries no network dependencies.

pub mod cleanup;
pub mod context;
pub mod error;
pub mod ports;

pub use cleanup::Cleanup;
pub use context::{CancelHandle, Context};
pub use error::CacheError;
pub use ports::{Cache, Ttl};
