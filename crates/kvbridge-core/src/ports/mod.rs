//! Ports - trait definitions for external dependencies.
//! Backends in `kvbridge-infra` implement these.

mod cache;

pub use cache::{Cache, Ttl};
