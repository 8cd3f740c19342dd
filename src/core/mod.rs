//! # Core
//!
//! Everything below the cluster layer: a single node connection, command
//! builders and reply converters, dial options, configuration.
//!
//! ## Modules
//!
//! - [`connection`] - Single node connection
//! - [`command`] - Command builders
//! - [`dial`] - Dial options derived from the config
//! - [`config`] - Cluster config and config file lookup
//! - [`builder`] - Cluster builder

pub use crate::proto::error::{Error, Result};

/// Cluster builder configuration.
pub mod builder;
/// Command construction helpers.
pub mod command;
/// Cluster configuration.
pub mod config;
/// Low-level connection management.
pub mod connection;
/// Connection-establishment options.
pub mod dial;
