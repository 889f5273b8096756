//! Cache connection configuration read from the environment.

use std::env;
use std::fmt;
use std::time::Duration;

use kvbridge_core::CacheError;

/// Prefix used by [`RedisConfig::from_env`].
pub const DEFAULT_PREFIX: &str = "CACHE";

/// Ceiling for opening the connection and answering the startup `PING`.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis connection configuration.
///
/// Read once at startup and handed to the connector; nothing re-reads the
/// environment afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Server addresses as `host:port`. Two or more select cluster mode.
    pub addrs: Vec<String>,
    /// Authentication secret, empty for none.
    pub password: String,
    /// Logical database selected after connecting.
    pub db: i64,
    /// Pool size hint, 0 for the client library default.
    pub pool_size: usize,
    /// Bound on connect plus health check.
    pub connect_timeout: Duration,
}

impl RedisConfig {
    /// Configuration for the given addresses with every option at its default.
    pub fn new<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addrs: addrs.into_iter().map(Into::into).collect(),
            password: String::new(),
            db: 0,
            pool_size: 0,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Load configuration from `CACHE_*` environment variables.
    pub fn from_env() -> Result<Self, CacheError> {
        Self::from_env_prefixed(DEFAULT_PREFIX)
    }

    /// Load configuration from `<prefix>_*` environment variables.
    pub fn from_env_prefixed(prefix: &str) -> Result<Self, CacheError> {
        Self::from_lookup(prefix, |name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Recognized variables: `<prefix>_ADDRS` (required, comma separated),
    /// `<prefix>_PASSWORD`, `<prefix>_DB` and `<prefix>_POOL_SIZE`. Empty
    /// values count as unset.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, CacheError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            let name = format!("{prefix}_{suffix}");
            let value = lookup(&name).filter(|v| !v.trim().is_empty());
            (name, value)
        };

        let (addrs_name, addrs) = var("ADDRS");
        let addrs: Vec<String> = addrs
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        if addrs.is_empty() {
            return Err(CacheError::Config(format!(
                "{addrs_name} is required and must list at least one host:port"
            )));
        }

        let (_, password) = var("PASSWORD");

        let (db_name, db) = var("DB");
        let db = parse_or(&db_name, db, 0)?;

        let (pool_name, pool_size) = var("POOL_SIZE");
        let pool_size = parse_or(&pool_name, pool_size, 0)?;

        Ok(Self {
            addrs,
            password: password.unwrap_or_default(),
            db,
            pool_size,
            connect_timeout: CONNECT_TIMEOUT,
        })
    }

    /// Cluster mode is selected by listing more than one address.
    pub fn is_cluster(&self) -> bool {
        self.addrs.len() > 1
    }
}

fn parse_or<T>(name: &str, value: Option<String>, default: T) -> Result<T, CacheError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CacheError::Config(format!("{name}={raw:?} is invalid: {e}"))),
        None => Ok(default),
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("RedisConfig")
            .field("addrs", &self.addrs)
            .field("password", &password)
            .field("db", &self.db)
            .field("pool_size", &self.pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
