//! Topology manager: owns the slot map and one pool per node.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::proto::error::{Error, Result};

use super::commands::cluster_slots;
use super::errors::parse_redis_error;
use super::pool::{NodePool, PoolConfig, PoolStats, PooledConnection};
use super::topology::ClusterTopology;

/// Port assumed for `redis://host` seeds without one.
const DEFAULT_PORT: u16 = 6379;

/// Routes slots to node pools and keeps the slot map current.
///
/// Pools are created lazily, the first time a node is needed. A refresh
/// only changes future routing: pools of nodes that left the topology are
/// closed, but connections already leased from them stay valid.
#[derive(Debug)]
pub(crate) struct Router {
    seeds: Vec<String>,
    pool_config: PoolConfig,
    topology: RwLock<ClusterTopology>,
    pools: RwLock<HashMap<String, Arc<NodePool>>>,
    refresh_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Router {
    /// Dials the seeds and loads the initial topology.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Topology`] if no seed is reachable or the first
    /// refresh fails.
    pub(crate) async fn connect(seeds: Vec<String>, pool_config: PoolConfig) -> Result<Self> {
        let router = Self {
            seeds,
            pool_config,
            topology: RwLock::new(ClusterTopology::new()),
            pools: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        };

        let dials = join_all(router.seeds.iter().map(|seed| router.pool_for(seed))).await;
        let mut last_error = None;
        for (seed, result) in router.seeds.iter().zip(dials) {
            if let Err(e) = result {
                warn!(seed = %seed, error = %e, "seed node unreachable");
                last_error = Some(e);
            }
        }
        if router.pools.read().await.is_empty() {
            return Err(Error::topology(format!(
                "no seed node reachable: {}",
                describe(last_error)
            )));
        }

        router.refresh().await?;
        Ok(router)
    }

    /// Reloads the slot map with `CLUSTER SLOTS`.
    ///
    /// Known nodes are asked first, then the seeds. Concurrent calls are
    /// serialized.
    #[instrument(skip(self))]
    pub(crate) async fn refresh(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        let mut candidates: Vec<String> = self
            .topology
            .read()
            .await
            .slot_ranges()
            .iter()
            .map(|r| r.master.clone())
            .collect();
        candidates.extend(self.seeds.iter().cloned());
        let mut seen = HashSet::new();
        candidates.retain(|address| seen.insert(address.clone()));

        let mut last_error = None;
        for address in &candidates {
            match self.fetch_topology(address).await {
                Ok(topology) => {
                    self.install(topology).await;
                    return Ok(());
                }
                Err(e) => {
                    debug!(address = %address, error = %e, "topology fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::topology(format!(
            "could not load slot map from any node: {}",
            describe(last_error)
        )))
    }

    /// Refreshes, logging instead of returning a failure.
    pub(crate) async fn refresh_best_effort(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "topology refresh failed");
        }
    }

    async fn fetch_topology(&self, address: &str) -> Result<ClusterTopology> {
        let mut conn = self.connection_for_address(address).await?;
        let reply = conn.send(cluster_slots()).await?;
        if let Some(message) = reply.as_error() {
            return Err(parse_redis_error(message));
        }
        ClusterTopology::from_cluster_slots(reply, address)
    }

    async fn install(&self, topology: ClusterTopology) {
        let nodes: HashSet<String> = topology.nodes().into_iter().map(String::from).collect();

        let removed: Vec<Arc<NodePool>> = {
            let mut pools = self.pools.write().await;
            let gone: Vec<String> = pools
                .keys()
                .filter(|address| !nodes.contains(*address))
                .cloned()
                .collect();
            gone.iter().filter_map(|address| pools.remove(address)).collect()
        };
        for pool in removed {
            debug!(address = pool.address(), "node left topology");
            pool.close();
        }

        debug!(
            nodes = nodes.len(),
            ranges = topology.slot_ranges().len(),
            "installed topology"
        );
        *self.topology.write().await = topology;
    }

    /// Returns the pool for `address`, creating it on first use.
    async fn pool_for(&self, address: &str) -> Result<Arc<NodePool>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::PoolClosed {
                address: address.to_string(),
            });
        }
        if let Some(pool) = self.pools.read().await.get(address) {
            if !pool.is_closed() {
                return Ok(Arc::clone(pool));
            }
        }

        // Dial outside the lock; a pool created concurrently wins.
        let pool = NodePool::new(address, self.pool_config.clone()).await?;
        let mut pools = self.pools.write().await;
        match pools.get(address) {
            Some(existing) if !existing.is_closed() => {
                pool.close();
                Ok(Arc::clone(existing))
            }
            _ => {
                pools.insert(address.to_string(), Arc::clone(&pool));
                Ok(pool)
            }
        }
    }

    /// Leases a connection to the master serving `slot`.
    pub(crate) async fn connection_for_slot(&self, slot: u16) -> Result<PooledConnection> {
        let address = self
            .topology
            .read()
            .await
            .master_for_slot(slot)
            .map(str::to_string)
            .ok_or_else(|| Error::topology(format!("no node serves slot {}", slot)))?;
        self.connection_for_address(&address).await
    }

    /// Leases a connection to a specific node.
    pub(crate) async fn connection_for_address(&self, address: &str) -> Result<PooledConnection> {
        self.pool_for(address).await?.get().await
    }

    /// Pool stats per node address.
    pub(crate) async fn stats(&self) -> BTreeMap<String, PoolStats> {
        self.pools
            .read()
            .await
            .iter()
            .map(|(address, pool)| (address.clone(), pool.stats()))
            .collect()
    }

    pub(crate) async fn topology(&self) -> ClusterTopology {
        self.topology.read().await.clone()
    }

    pub(crate) async fn node_count(&self) -> usize {
        self.topology.read().await.nodes().len()
    }

    pub(crate) async fn slot_range_count(&self) -> usize {
        self.topology.read().await.slot_ranges().len()
    }

    pub(crate) async fn is_fully_covered(&self) -> bool {
        self.topology.read().await.is_fully_covered()
    }

    /// Closes every pool; later leases fail with [`Error::PoolClosed`].
    pub(crate) async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for (_, pool) in self.pools.write().await.drain() {
            pool.close();
        }
    }
}

fn describe(error: Option<Error>) -> String {
    error.map_or_else(|| "no candidates".to_string(), |e| e.to_string())
}

/// Splits a comma-separated host list into `host:port` seed addresses.
///
/// Entries may be bare `host:port` or `redis://host[:port]` URLs.
pub(crate) fn parse_seeds(hosts: &str) -> Result<Vec<String>> {
    let seeds = hosts
        .split(',')
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .map(normalize_address)
        .collect::<Result<Vec<_>>>()?;

    if seeds.is_empty() {
        return Err(Error::InvalidArgument {
            message: "no seed node configured".to_string(),
        });
    }
    Ok(seeds)
}

fn normalize_address(host: &str) -> Result<String> {
    if !host.contains("://") {
        return Ok(host.to_string());
    }

    let invalid = |reason: String| Error::InvalidArgument {
        message: format!("invalid seed address {:?}: {}", host, reason),
    };
    let url = Url::parse(host).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "redis" {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    let name = url
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;
    Ok(format!("{}:{}", name, url.port().unwrap_or(DEFAULT_PORT)))
}
