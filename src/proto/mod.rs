//! RESP2 wire protocol: frames, the streaming codec and the crate error type.

pub mod codec;
/// Error types.
pub mod error;
pub mod frame;
