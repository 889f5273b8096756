use async_trait::async_trait;
use std::time::Duration;

use crate::context::Context;
use crate::error::CacheError;

/// Cache trait - the five-operation facade over a key-value cache service.
///
/// Every call is a single round trip bounded by `ctx`. Errors are returned
/// as reported by the backend; nothing is retried or masked.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Store `value` under `key`. A zero `exp` stores it without expiration.
    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        exp: Duration,
    ) -> Result<(), CacheError>;

    /// Fetch the value for `key`, failing with [`CacheError::NotFound`] on a miss.
    async fn get(&self, ctx: &Context, key: &str) -> Result<String, CacheError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn del(&self, ctx: &Context, key: &str) -> Result<(), CacheError>;

    /// Check whether `key` is present. Absence is `Ok(false)`, never an error.
    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool, CacheError>;

    /// Remaining time-to-live of `key`.
    async fn ttl(&self, ctx: &Context, key: &str) -> Result<Ttl, CacheError>;
}

/// Reply of a TTL query.
///
/// The server answers `TTL` with whole seconds, `-1` for a key without
/// expiration and `-2` for an absent key. The sentinels map to their own
/// variants so they can never be mistaken for a zero duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    Expires(Duration),
    Persistent,
    Missing,
}

impl Ttl {
    pub const PERSISTENT_REPLY: i64 = -1;
    pub const MISSING_REPLY: i64 = -2;

    /// Decode a raw `TTL` reply. Negative values other than `-1` are treated
    /// as a missing key.
    pub fn from_reply(secs: i64) -> Self {
        match secs {
            Self::PERSISTENT_REPLY => Self::Persistent,
            s if s >= 0 => Self::Expires(Duration::from_secs(s.unsigned_abs())),
            _ => Self::Missing,
        }
    }

    /// The raw server reply this value stands for.
    pub fn as_reply(&self) -> i64 {
        match self {
            Self::Expires(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            Self::Persistent => Self::PERSISTENT_REPLY,
            Self::Missing => Self::MISSING_REPLY,
        }
    }

    /// Remaining lifetime for an expiring key.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Expires(d) => Some(*d),
            Self::Persistent | Self::Missing => None,
        }
    }
}
