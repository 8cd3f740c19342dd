//! Human-readable pool status.

use std::collections::BTreeMap;

use crate::proto::error::Result;

use super::pool::PoolStats;

/// Renders stats as pretty JSON. Keys come out sorted by node address.
pub(crate) fn render(stats: &BTreeMap<String, PoolStats>) -> Result<String> {
    Ok(serde_json::to_string_pretty(stats)?)
}
