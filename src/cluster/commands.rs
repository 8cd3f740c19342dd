//! Cluster management commands used for topology discovery and redirects.

use crate::core::command::Cmd;

/// Creates a CLUSTER SLOTS command.
///
/// The reply maps slot ranges to their master and replica nodes and is the
/// source of every topology refresh.
pub fn cluster_slots() -> Cmd {
    Cmd::new("CLUSTER").arg("SLOTS")
}

/// Creates an ASKING command.
///
/// Sent before a command redirected with `ASK`. The flag only affects the
/// command that immediately follows it on the same connection.
pub fn asking() -> Cmd {
    Cmd::new("ASKING")
}
