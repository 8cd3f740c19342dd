//! RESP protocol encoder and decoder.

mod decoder;
mod encoder;

pub use decoder::Decoder;
pub use encoder::{encode_frame, Encoder};
