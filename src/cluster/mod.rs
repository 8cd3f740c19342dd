//! # Cluster
//!
//! Slot-routed access to a Redis Cluster.
//!
//! - **Slot hashing**: CRC16 of the key or its `{hash tag}`, modulo 16384
//! - **Topology**: `CLUSTER SLOTS` maps slot ranges to nodes, reloaded on
//!   `MOVED`, `CLUSTERDOWN` and connection failures
//! - **Pooling**: one bounded pool per node, created on first use
//! - **Retries**: redirects and connection failures are retried with a fixed
//!   delay up to the configured count

mod client;
pub mod commands;
mod errors;
mod pool;
mod retry;
mod router;
mod slot;
mod status;
mod topology;

pub use client::{effective_ttl, Cluster, DEFAULT_TTL};
pub use pool::PoolStats;
pub use slot::{key_slot, slot_for_bytes, SLOT_COUNT};
pub use topology::{ClusterTopology, SlotRange};
