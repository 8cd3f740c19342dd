//! Classification of cluster error replies.
//!
//! - `MOVED <slot> <host>:<port>`: permanent redirect
//! - `ASK <slot> <host>:<port>`: one-shot redirect during migration
//! - `TRYAGAIN`: multi-key request during resharding
//! - `CLUSTERDOWN`: cluster cannot serve the slot
//! - `CROSSSLOT`: keys hash to different slots

use crate::proto::error::Error;

/// Turns an error reply into a typed error.
pub fn parse_redis_error(error_msg: &[u8]) -> Error {
    let msg = String::from_utf8_lossy(error_msg);
    let msg = msg.trim();

    if let Some((slot, address)) = msg.strip_prefix("MOVED ").and_then(parse_redirect) {
        return Error::Moved { slot, address };
    }
    if let Some((slot, address)) = msg.strip_prefix("ASK ").and_then(parse_redirect) {
        return Error::Ask { slot, address };
    }
    if msg.starts_with("TRYAGAIN") {
        return Error::TryAgain;
    }
    if msg.starts_with("CLUSTERDOWN") {
        return Error::ClusterDown;
    }
    if msg.starts_with("CROSSSLOT") {
        return Error::CrossSlot;
    }

    Error::Server {
        message: msg.to_string(),
    }
}

/// Parses "<slot> <host>:<port>".
fn parse_redirect(args: &str) -> Option<(u16, String)> {
    let mut parts = args.split_whitespace();
    let slot = parts.next()?.parse().ok()?;
    let address = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some((slot, address.to_string()))
}

/// What the retry wrapper does with a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RetryAction {
    /// Refresh the slot map, then send the next attempt to `address`.
    Moved(String),
    /// Send the next attempt to `address`, preceded by `ASKING`.
    Ask(String),
    /// Retry against the slot owner without touching the slot map.
    Reroute,
    /// Refresh the slot map and retry against the slot owner.
    Refresh,
    /// Drop the connection, refresh the slot map and retry.
    Reconnect,
    /// Give up and return the error.
    Fail,
}

impl RetryAction {
    pub(crate) fn for_error(error: &Error) -> Self {
        match error {
            Error::Moved { address, .. } => RetryAction::Moved(address.clone()),
            Error::Ask { address, .. } => RetryAction::Ask(address.clone()),
            Error::TryAgain => RetryAction::Reroute,
            Error::ClusterDown => RetryAction::Refresh,
            e if e.is_connection_error() => RetryAction::Reconnect,
            _ => RetryAction::Fail,
        }
    }
}
