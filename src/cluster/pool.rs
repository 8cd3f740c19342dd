//! Connection pooling for Redis Cluster nodes.
//!
//! Each node gets its own [`NodePool`]. A pool bounds the number of leased
//! connections with a semaphore and keeps a small LIFO list of idle
//! connections. Idle connections expire after the idle timeout, and those
//! idle for at least a second are probed with `PING` before being handed out.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::core::command;
use crate::core::config::ClusterConfig;
use crate::core::connection::Connection;
use crate::core::dial::{dial_options, DialOption};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// Idle time after which a connection is probed before reuse.
pub const TEST_ON_BORROW_AFTER: Duration = Duration::from_secs(1);

/// Configuration shared by every node pool of a cluster.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum leased connections per node, 0 for unbounded
    pub max_active: usize,
    /// Maximum idle connections kept per node
    pub max_idle: usize,
    /// Idle connections older than this are closed
    pub idle_timeout: Option<Duration>,
    /// How long `get` waits for a free lease
    pub wait_timeout: Option<Duration>,
    /// Idle time after which a connection is probed with `PING`
    pub test_on_borrow_after: Duration,
    /// Options applied to every dial
    pub dial_options: Vec<DialOption>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_cluster_config(&ClusterConfig::default())
    }
}

impl PoolConfig {
    /// Derives pool settings and dial options from a cluster config.
    pub fn from_cluster_config(config: &ClusterConfig) -> Self {
        Self {
            max_active: config.max_active,
            max_idle: config.max_idle,
            idle_timeout: config.idle_timeout(),
            wait_timeout: config.wait_timeout(),
            test_on_borrow_after: TEST_ON_BORROW_AFTER,
            dial_options: dial_options(config),
        }
    }
}

/// Connection counts of one node pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Connections currently leased out
    pub active: usize,
    /// Connections waiting in the idle list
    pub idle: usize,
}

struct IdleConn {
    conn: Connection,
    since: Instant,
}

/// Bounded pool of connections to a single node.
pub struct NodePool {
    address: String,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConn>>,
    active: AtomicUsize,
    closed: AtomicBool,
}

impl NodePool {
    /// Creates a pool for `address` after one trial dial.
    ///
    /// The trial connection is kept as the first idle connection. If the
    /// dial fails no pool is created.
    pub async fn new(address: impl Into<String>, config: PoolConfig) -> Result<Arc<Self>> {
        let address = address.into();
        let trial = Connection::dial(&address, &config.dial_options).await?;

        let max_permits = match config.max_active {
            0 => Semaphore::MAX_PERMITS,
            n => n,
        };
        let pool = Arc::new(Self {
            permits: Arc::new(Semaphore::new(max_permits)),
            idle: Mutex::new(VecDeque::with_capacity(config.max_idle)),
            active: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            address,
            config,
        });
        pool.put_idle(trial);

        debug!(address = %pool.address, "created node pool");
        Ok(pool)
    }

    /// Address of the node this pool connects to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Leases a connection, waiting for a free slot if `max_active` is
    /// reached.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolExhausted`] if the wait timeout elapses first
    /// - [`Error::PoolClosed`] if the pool is closed
    /// - any dial error when a fresh connection is needed
    pub async fn get(self: &Arc<Self>) -> Result<PooledConnection> {
        let permit = self.acquire_permit().await?;

        let conn = match self.take_idle().await {
            Some(conn) => conn,
            None => Connection::dial(&self.address, &self.config.dial_options).await?,
        };

        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = match self.config.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, acquire)
                .await
                .map_err(|_| Error::PoolExhausted {
                    address: self.address.clone(),
                })?,
            None => acquire.await,
        };
        permit.map_err(|_| self.closed_error())
    }

    /// Pops idle connections until one is fresh enough or passes a `PING`.
    async fn take_idle(&self) -> Option<Connection> {
        loop {
            let IdleConn { mut conn, since } = self.lock_idle().pop_back()?;
            let idle_for = since.elapsed();

            if matches!(self.config.idle_timeout, Some(limit) if idle_for > limit) {
                debug!(address = %self.address, ?idle_for, "closing expired idle connection");
                continue;
            }
            if idle_for < self.config.test_on_borrow_after {
                return Some(conn);
            }
            match conn.send(command::ping()).await {
                Ok(Frame::SimpleString(ref s)) if s == b"PONG" => return Some(conn),
                Ok(reply) => {
                    warn!(address = %self.address, ?reply, "liveness probe failed");
                }
                Err(e) => {
                    warn!(address = %self.address, error = %e, "liveness probe failed");
                }
            }
        }
    }

    fn put_idle(&self, conn: Connection) {
        if conn.is_broken() || self.is_closed() {
            return;
        }
        let mut idle = self.lock_idle();
        if idle.len() < self.config.max_idle {
            idle.push_back(IdleConn {
                conn,
                since: Instant::now(),
            });
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, VecDeque<IdleConn>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current active and idle counts.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active: self.active.load(Ordering::SeqCst),
            idle: self.lock_idle().len(),
        }
    }

    /// Closes the pool.
    ///
    /// Idle connections are dropped and waiters fail with
    /// [`Error::PoolClosed`]. Leased connections stay usable until they are
    /// released, then they are closed instead of returned.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        self.lock_idle().clear();
        debug!(address = %self.address, "closed node pool");
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn closed_error(&self) -> Error {
        Error::PoolClosed {
            address: self.address.clone(),
        }
    }
}

impl fmt::Debug for NodePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodePool")
            .field("address", &self.address)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A connection leased from a [`NodePool`].
///
/// Dereferences to [`Connection`]. Dropping the lease returns the
/// connection to the idle list unless it is broken, the pool is closed, or
/// the idle list is full.
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<NodePool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Address of the node this connection talks to.
    pub fn address(&self) -> &str {
        self.pool.address()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only taken in drop.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.pool.active.fetch_sub(1, Ordering::SeqCst);
        if let Some(conn) = self.conn.take() {
            self.pool.put_idle(conn);
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.pool.address)
            .finish()
    }
}
