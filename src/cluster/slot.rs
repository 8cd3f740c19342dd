//! Redis Cluster slot calculation.
//!
//! Keys map to one of 16384 slots by CRC16/XMODEM of the key, or of its
//! hash tag when the key contains a non-empty `{...}` section.

use crc::{Crc, CRC_16_XMODEM};

/// Number of hash slots in Redis Cluster.
pub const SLOT_COUNT: u16 = 16384;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the cluster slot for a key.
///
/// # Examples
///
/// ```
/// use slotcache::key_slot;
///
/// assert_eq!(key_slot("foo"), 12182);
/// assert_eq!(key_slot("{user1000}.following"), key_slot("{user1000}.followers"));
/// ```
pub fn key_slot(key: &str) -> u16 {
    slot_for_bytes(key.as_bytes())
}

/// Calculates the cluster slot for a binary key.
pub fn slot_for_bytes(key: &[u8]) -> u16 {
    CRC16.checksum(hash_tag(key)) % SLOT_COUNT
}

/// Returns the part of the key that is hashed.
///
/// That is the bytes between the first `{` and the first `}` after it, as
/// long as they are non-empty; otherwise the whole key.
fn hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = key.iter().position(|&b| b == b'{') else {
        return key;
    };
    match key[open + 1..].iter().position(|&b| b == b'}') {
        Some(len) if len > 0 => &key[open + 1..open + 1 + len],
        _ => key,
    }
}
