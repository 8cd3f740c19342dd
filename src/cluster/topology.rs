//! Slot-to-node map parsed from `CLUSTER SLOTS`.

use std::collections::BTreeSet;

use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

use super::slot::SLOT_COUNT;

/// A range of hash slots owned by one master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    /// Start of the slot range (inclusive)
    pub start: u16,
    /// End of the slot range (inclusive)
    pub end: u16,
    /// Address of the master serving this range
    pub master: String,
    /// Addresses of its replicas
    pub replicas: Vec<String>,
}

impl SlotRange {
    /// Returns true if the given slot is within this range.
    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }

    /// Returns the number of slots in this range.
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Always false, ranges hold at least one slot.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// The cluster's slot ownership, sorted by slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterTopology {
    slot_ranges: Vec<SlotRange>,
}

impl ClusterTopology {
    /// Creates an empty topology that routes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `CLUSTER SLOTS` reply.
    ///
    /// `queried` is the address the reply came from; nodes reported with an
    /// empty IP live on that host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Topology`] if the reply is not an array, a range is
    /// malformed, or no range is reported at all.
    pub fn from_cluster_slots(frame: Frame, queried: &str) -> Result<Self> {
        let ranges = match frame {
            Frame::Array(ranges) => ranges,
            other => {
                return Err(Error::topology(format!(
                    "CLUSTER SLOTS reply must be an array, got {:?}",
                    other
                )))
            }
        };

        let mut slot_ranges = Vec::with_capacity(ranges.len());
        for range in ranges {
            slot_ranges.push(Self::parse_range(range, queried)?);
        }
        if slot_ranges.is_empty() {
            return Err(Error::topology("cluster reports no slot ranges"));
        }
        slot_ranges.sort_by_key(|r| r.start);

        Ok(Self { slot_ranges })
    }

    fn parse_range(frame: Frame, queried: &str) -> Result<SlotRange> {
        let items = match frame {
            Frame::Array(items) if items.len() >= 3 => items,
            other => {
                return Err(Error::topology(format!(
                    "malformed slot range {:?}",
                    other
                )))
            }
        };

        let slot = |frame: &Frame| match frame {
            Frame::Integer(n) if (0..SLOT_COUNT as i64).contains(n) => Ok(*n as u16),
            other => Err(Error::topology(format!("invalid slot {:?}", other))),
        };
        let start = slot(&items[0])?;
        let end = slot(&items[1])?;
        if end < start {
            return Err(Error::topology(format!(
                "slot range {}-{} is inverted",
                start, end
            )));
        }

        let master = Self::parse_node(&items[2], queried)?;
        let replicas = items[3..]
            .iter()
            .filter_map(|node| Self::parse_node(node, queried).ok())
            .collect();

        Ok(SlotRange {
            start,
            end,
            master,
            replicas,
        })
    }

    /// Parses `[ip, port, id?, ...]` into `ip:port`.
    fn parse_node(frame: &Frame, queried: &str) -> Result<String> {
        let items = match frame {
            Frame::Array(items) if items.len() >= 2 => items,
            other => return Err(Error::topology(format!("malformed node {:?}", other))),
        };
        let host = match &items[0] {
            Frame::BulkString(Some(ip)) if !ip.is_empty() => String::from_utf8_lossy(ip).into_owned(),
            Frame::BulkString(_) => host_of(queried).to_string(),
            other => return Err(Error::topology(format!("invalid node ip {:?}", other))),
        };
        let port = match &items[1] {
            Frame::Integer(p) if (1..=u16::MAX as i64).contains(p) => *p,
            other => return Err(Error::topology(format!("invalid node port {:?}", other))),
        };
        if host.contains(':') && !host.starts_with('[') {
            Ok(format!("[{}]:{}", host, port))
        } else {
            Ok(format!("{}:{}", host, port))
        }
    }

    /// Returns the master address owning `slot`.
    pub fn master_for_slot(&self, slot: u16) -> Option<&str> {
        let idx = self.slot_ranges.partition_point(|r| r.end < slot);
        self.slot_ranges
            .get(idx)
            .filter(|r| r.contains(slot))
            .map(|r| r.master.as_str())
    }

    /// All slot ranges, sorted by start.
    pub fn slot_ranges(&self) -> &[SlotRange] {
        &self.slot_ranges
    }

    /// Every master and replica address, deduplicated and sorted.
    pub fn nodes(&self) -> BTreeSet<&str> {
        self.slot_ranges
            .iter()
            .flat_map(|r| std::iter::once(&r.master).chain(r.replicas.iter()))
            .map(String::as_str)
            .collect()
    }

    /// Returns true if every slot 0-16383 has an owner.
    pub fn is_fully_covered(&self) -> bool {
        let mut next = 0u32;
        for range in &self.slot_ranges {
            if u32::from(range.start) > next {
                return false;
            }
            next = next.max(u32::from(range.end) + 1);
        }
        next == u32::from(SLOT_COUNT)
    }
}

fn host_of(address: &str) -> &str {
    address
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(address)
}
