//! Redis connector: opens a single-node or cluster connection and checks it with `PING`.

use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::{Client, Cmd, IntoConnectionInfo, Pipeline, RedisFuture, Value};

use kvbridge_core::CacheError;

use super::config::RedisConfig;

/// Live, cloneable link to the cache service.
///
/// Both variants multiplex requests over shared sockets, so clones can be
/// used from many tasks at once without extra locking.
#[derive(Clone)]
pub(crate) enum Connection {
    Single(ConnectionManager),
    Cluster(ClusterConnection),
}

impl ConnectionLike for Connection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            Self::Single(conn) => conn.req_packed_command(cmd),
            Self::Cluster(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            Self::Single(conn) => conn.req_packed_commands(cmd, offset, count),
            Self::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            Self::Single(conn) => conn.get_db(),
            Self::Cluster(conn) => conn.get_db(),
        }
    }
}

/// Open a connection for `config` and verify it answers `PING`.
///
/// Callers bound this with the configured connect timeout.
pub(crate) async fn open(config: &RedisConfig) -> Result<Connection, CacheError> {
    let mut conn = if config.is_cluster() {
        open_cluster(config).await?
    } else {
        open_single(config).await?
    };

    if config.pool_size > 0 {
        tracing::debug!(
            pool_size = config.pool_size,
            "Pool size hint recorded; requests share one multiplexed connection"
        );
    }

    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| CacheError::Connection(format!("PING failed: {e}")))?;

    Ok(conn)
}

async fn open_single(config: &RedisConfig) -> Result<Connection, CacheError> {
    let addr = config
        .addrs
        .first()
        .ok_or_else(|| CacheError::Connection("no cache address configured".to_string()))?;

    let mut info = node_url(addr)
        .into_connection_info()
        .map_err(|e| CacheError::Connection(format!("invalid address {addr:?}: {e}")))?;
    info.redis.db = config.db;
    if !config.password.is_empty() {
        info.redis.password = Some(config.password.clone());
    }

    let client = Client::open(info).map_err(|e| CacheError::Connection(e.to_string()))?;
    let manager = ConnectionManager::new(client)
        .await
        .map_err(|e| CacheError::Connection(e.to_string()))?;

    Ok(Connection::Single(manager))
}

async fn open_cluster(config: &RedisConfig) -> Result<Connection, CacheError> {
    if config.db != 0 {
        tracing::warn!(
            db = config.db,
            "Cluster mode only has database 0; ignoring configured database index"
        );
    }

    let nodes: Vec<String> = config.addrs.iter().map(|a| node_url(a)).collect();
    let mut builder = ClusterClientBuilder::new(nodes);
    if !config.password.is_empty() {
        builder = builder.password(config.password.clone());
    }

    let client = builder
        .build()
        .map_err(|e| CacheError::Connection(e.to_string()))?;
    let conn = client
        .get_async_connection()
        .await
        .map_err(|e| CacheError::Connection(e.to_string()))?;

    Ok(Connection::Cluster(conn))
}

/// `host:port` becomes `redis://host:port`; full URLs pass through.
fn node_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}
