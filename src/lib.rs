//! # Slotcache
//!
//! Async Redis Cluster cache client with per-node connection pools, slot
//! routing and bounded retries.
//!
//! ## Features
//!
//! - Seven TTL-bearing cache operations: `del`, `get`, `setex`, `hget`,
//!   `hset`, `hmget`, `hmset`
//! - `MOVED`/`ASK` redirects and connection failures retried with a fixed
//!   delay
//! - Per-node pools with idle expiry and liveness probes
//! - Pool status rendered as indented JSON
//! - Environment-suffixed INI/TOML config lookup
//!
//! ## Example
//!
//! ```no_run
//! use slotcache::{Cluster, ClusterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config: ClusterConfig = slotcache::load_module_config("redis", &["/etc/myapp"])?;
//!     let cluster = Cluster::initialize(config).await?;
//!
//!     cluster.hset("user:1", "name", "ada", 0).await?;
//!     let name = cluster.hget("user:1", "name").await?;
//!     assert_eq!(name, "ada");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod core;
pub(crate) mod proto;

pub(crate) mod cluster;

#[cfg(test)]
mod stress;

#[cfg(test)]
mod testing;

pub use crate::core::builder::ClusterBuilder;
pub use crate::core::config::{
    load_module_config, load_module_config_for, ClusterConfig, DEFAULT_ENVIRONMENT,
    ENVIRONMENT_VAR,
};
pub use crate::core::dial::{dial_options, DialOption};
pub use crate::core::{Error, Result};

pub use crate::proto::frame::Frame;

pub use crate::cluster::{
    effective_ttl, key_slot, slot_for_bytes, Cluster, ClusterTopology, PoolStats, SlotRange,
    DEFAULT_TTL, SLOT_COUNT,
};
