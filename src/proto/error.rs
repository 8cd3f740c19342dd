use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for slotcache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a Redis Cluster.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred on a node connection.
    #[error("IO error: {source}")]
    Io {
        /// The underlying IO error.
        #[from]
        source: io::Error,
    },

    /// A connect, read or write did not finish within its configured timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// Which phase timed out ("connect", "read", "write", "pool wait").
        operation: &'static str,
    },

    /// The node closed the connection before replying.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// No connection could be leased from a node pool before the wait timeout.
    #[error("connection pool exhausted for {address}")]
    PoolExhausted {
        /// Address of the node whose pool is exhausted.
        address: String,
    },

    /// The node pool was closed, either by `Cluster::close` or because the
    /// node left the topology.
    #[error("connection pool closed for {address}")]
    PoolClosed {
        /// Address of the node whose pool is closed.
        address: String,
    },

    /// The reply had an unexpected shape or value.
    #[error("protocol error: {message}")]
    Protocol {
        /// Description of the error.
        message: String,
    },

    /// The server returned an error.
    #[error("server error: {message}")]
    Server {
        /// Error message from server.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed")]
    Auth,

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of invalid argument.
        message: String,
    },

    /// Key moved to another node (permanent redirect).
    ///
    /// The slot for the requested key has been migrated to a different node.
    /// The slot map is refreshed and the command is retried on `address`.
    #[error("MOVED to slot {slot} at {address}")]
    Moved {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node owning this slot (e.g., "127.0.0.1:7001").
        address: String,
    },

    /// Temporary redirect during migration (ASK redirect).
    ///
    /// The command is retried once on `address`, preceded by `ASKING`. The
    /// slot map is left untouched.
    #[error("ASK to slot {slot} at {address}")]
    Ask {
        /// The slot number (0-16383).
        slot: u16,
        /// The address of the node temporarily handling this slot.
        address: String,
    },

    /// The slot is being migrated and the key is not yet available.
    #[error("TRYAGAIN slot migration in progress")]
    TryAgain,

    /// Redis Cluster is down or unavailable.
    #[error("CLUSTERDOWN cluster is down")]
    ClusterDown,

    /// Multi-key operation with keys in different slots.
    #[error("CROSSSLOT keys in multi-key operation map to different slots")]
    CrossSlot,

    /// The cluster topology could not be discovered or does not cover a slot.
    #[error("topology error: {message}")]
    Topology {
        /// Description of the error.
        message: String,
    },

    /// No readable configuration file was found in any search path.
    #[error("cannot find config for module {module} ({environment}) in {searched:?}")]
    ConfigLookup {
        /// Module name used to build the file name.
        module: String,
        /// Environment suffix used to build the file name.
        environment: String,
        /// Every candidate path that was tried, in order.
        searched: Vec<PathBuf>,
    },

    /// The status snapshot could not be rendered.
    #[error("status rendering failed: {source}")]
    Status {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Returns true if the error means the connection itself failed.
    ///
    /// Such a connection is never handed out again.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Io { .. }
                | Error::Timeout { .. }
                | Error::ConnectionClosed
                | Error::PoolExhausted { .. }
                | Error::PoolClosed { .. }
        )
    }

    /// Returns true for MOVED and ASK redirects.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Error::Moved { .. } | Error::Ask { .. })
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn topology(message: impl Into<String>) -> Self {
        Error::Topology {
            message: message.into(),
        }
    }
}
