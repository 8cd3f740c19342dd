//! The public cluster handle and its key/value and hash operations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::core::command::{self, frame_to_int, frame_to_ok, frame_to_optional_string};
use crate::core::config::ClusterConfig;
use crate::proto::error::{Error, Result};

use super::pool::{PoolConfig, PoolStats};
use super::retry::RetryConnection;
use super::router::{parse_seeds, Router};
use super::status;
use super::topology::ClusterTopology;

/// TTL in seconds used by write operations called with a TTL of 0.
pub const DEFAULT_TTL: u64 = 3600;

/// Resolves the TTL sent to the server: 0 means [`DEFAULT_TTL`].
pub fn effective_ttl(ttl: u64) -> u64 {
    if ttl == 0 {
        DEFAULT_TTL
    } else {
        ttl
    }
}

/// Handle to a Redis Cluster.
///
/// Cheap to clone and safe to share between tasks. Every operation leases a
/// connection to the node serving its key, retries redirects and connection
/// failures up to `retry_count` times, and returns the connection to its
/// pool on every exit path.
///
/// All writes carry a TTL; passing 0 uses [`DEFAULT_TTL`].
///
/// # Example
///
/// ```no_run
/// # async fn example() -> slotcache::Result<()> {
/// use slotcache::{Cluster, ClusterConfig};
///
/// let cluster = Cluster::initialize(ClusterConfig {
///     host: "127.0.0.1:7000".to_string(),
///     ..ClusterConfig::default()
/// })
/// .await?;
///
/// cluster.setex("session:42", "token", 0).await?;
/// assert_eq!(cluster.get("session:42").await?, "token");
/// println!("{}", cluster.status().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Cluster {
    router: Arc<Router>,
    retry_count: u32,
    retry_delay: Duration,
}

impl Cluster {
    /// Connects to the cluster described by `config`.
    ///
    /// Dials the seed node(s) in `config.host`, loads the slot map, and
    /// copies the retry settings. Node pools other than the seeds' are
    /// created the first time a command needs them.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `host` holds no usable address
    /// - [`Error::Topology`] if no seed is reachable or the slot map cannot
    ///   be loaded
    pub async fn initialize(config: ClusterConfig) -> Result<Self> {
        let seeds = parse_seeds(&config.host)?;
        let router = Router::connect(seeds, PoolConfig::from_cluster_config(&config)).await?;

        info!(
            nodes = router.node_count().await,
            ranges = router.slot_range_count().await,
            "cluster initialized"
        );

        Ok(Self {
            router: Arc::new(router),
            retry_count: config.retry_count,
            retry_delay: config.retry_delay(),
        })
    }

    async fn bind(&self, key: &str) -> Result<RetryConnection<'_>> {
        RetryConnection::bind(&self.router, key, self.retry_count, self.retry_delay).await
    }

    /// Deletes `key`. Deleting a missing key is not an error.
    pub async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.bind(key).await?;
        let removed = frame_to_int(conn.execute(command::del(key.to_owned())).await?)?;
        if removed < 0 {
            return Err(unexpected(removed));
        }
        Ok(())
    }

    /// Reads `key`. A missing key reads as the empty string.
    pub async fn get(&self, key: &str) -> Result<String> {
        let mut conn = self.bind(key).await?;
        let reply = conn.execute(command::get(key.to_owned())).await?;
        Ok(frame_to_optional_string(reply)?.unwrap_or_default())
    }

    /// Writes `value` to `key` with a TTL of `ttl` seconds.
    pub async fn setex(&self, key: &str, value: &str, ttl: u64) -> Result<()> {
        let mut conn = self.bind(key).await?;
        let cmd = command::set_ex(key.to_owned(), value.to_owned(), effective_ttl(ttl));
        frame_to_ok(conn.execute(cmd).await?)
    }

    /// Reads one hash field. A missing key or field reads as the empty
    /// string.
    pub async fn hget(&self, key: &str, field: &str) -> Result<String> {
        let mut conn = self.bind(key).await?;
        let reply = conn
            .execute(command::hget(key.to_owned(), field.to_owned()))
            .await?;
        Ok(frame_to_optional_string(reply)?.unwrap_or_default())
    }

    /// Writes one hash field, then sets the key's TTL.
    ///
    /// The two steps are separate round trips. If the second one fails the
    /// field is written but keeps the key's previous expiry; calling `hset`
    /// again is safe.
    pub async fn hset(&self, key: &str, field: &str, value: &str, ttl: u64) -> Result<()> {
        let mut conn = self.bind(key).await?;
        let cmd = command::hset(key.to_owned(), field.to_owned(), value.to_owned());
        expect_flag(frame_to_int(conn.execute(cmd).await?)?)?;
        expire(&mut conn, key, ttl).await
    }

    /// Reads several hash fields, in request order. Missing fields read as
    /// the empty string.
    pub async fn hmget<F: AsRef<str>>(&self, key: &str, fields: &[F]) -> Result<Vec<String>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.bind(key).await?;
        let cmd = command::hmget(
            key.to_owned(),
            fields.iter().map(|f| f.as_ref().to_owned()),
        );
        let values = command::frame_to_vec_optional_string(conn.execute(cmd).await?)?;
        if values.len() != fields.len() {
            return Err(Error::protocol(format!(
                "HMGET returned {} values for {} fields",
                values.len(),
                fields.len()
            )));
        }
        Ok(values.into_iter().map(Option::unwrap_or_default).collect())
    }

    /// Writes several hash fields, then sets the key's TTL.
    ///
    /// Same two-step behavior as [`hset`](Self::hset).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `fields` is empty.
    pub async fn hmset<I, K, V>(&self, key: &str, ttl: u64, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let pairs: Vec<(String, String)> = fields
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        if pairs.is_empty() {
            return Err(Error::InvalidArgument {
                message: "HMSET needs at least one field".to_string(),
            });
        }

        let mut conn = self.bind(key).await?;
        frame_to_ok(conn.execute(command::hmset(key.to_owned(), pairs)).await?)?;
        expire(&mut conn, key, ttl).await
    }

    /// Renders per-node pool stats as indented JSON keyed by node address.
    ///
    /// Reads local counters only, nothing is sent to the cluster.
    pub async fn status(&self) -> Result<String> {
        status::render(&self.pool_stats().await)
    }

    /// Per-node pool stats, keyed by node address.
    pub async fn pool_stats(&self) -> BTreeMap<String, PoolStats> {
        self.router.stats().await
    }

    /// Reloads the slot map now instead of waiting for a redirect.
    pub async fn refresh(&self) -> Result<()> {
        self.router.refresh().await
    }

    /// Snapshot of the current slot map.
    pub async fn topology(&self) -> ClusterTopology {
        self.router.topology().await
    }

    /// Returns the number of known nodes in the cluster.
    pub async fn node_count(&self) -> usize {
        self.router.node_count().await
    }

    /// Returns the total number of slot ranges in the cluster.
    pub async fn slot_range_count(&self) -> usize {
        self.router.slot_range_count().await
    }

    /// Checks if the cluster covers all slots (0-16383).
    pub async fn is_fully_covered(&self) -> bool {
        self.router.is_fully_covered().await
    }

    /// Closes every node pool. Operations started afterwards fail with
    /// [`Error::PoolClosed`].
    pub async fn close(&self) {
        self.router.close().await;
    }
}

async fn expire(conn: &mut RetryConnection<'_>, key: &str, ttl: u64) -> Result<()> {
    let cmd = command::expire(key.to_owned(), effective_ttl(ttl));
    expect_flag(frame_to_int(conn.execute(cmd).await?)?)
}

/// Accepts the 0/1 replies of HSET and EXPIRE.
fn expect_flag(n: i64) -> Result<()> {
    match n {
        0 | 1 => Ok(()),
        other => Err(unexpected(other)),
    }
}

fn unexpected(n: i64) -> Error {
    Error::protocol(format!("unexpected redis response {}", n))
}
