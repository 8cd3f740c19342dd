use bytes::{BufMut, BytesMut};

use crate::proto::frame::Frame;

/// Appends the RESP encoding of `frame` to `buf`.
pub fn encode_frame(frame: &Frame, buf: &mut BytesMut) {
    match frame {
        Frame::SimpleString(s) => put_line(buf, b'+', s),
        Frame::Error(e) => put_line(buf, b'-', e),
        Frame::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
        Frame::BulkString(Some(data)) => {
            put_line(buf, b'$', data.len().to_string().as_bytes());
            buf.extend_from_slice(data);
            buf.extend_from_slice(b"\r\n");
        }
        Frame::BulkString(None) => buf.extend_from_slice(b"$-1\r\n"),
        Frame::Array(items) => {
            put_line(buf, b'*', items.len().to_string().as_bytes());
            for item in items {
                encode_frame(item, buf);
            }
        }
        Frame::Null => buf.extend_from_slice(b"*-1\r\n"),
    }
}

fn put_line(buf: &mut BytesMut, prefix: u8, body: &[u8]) {
    buf.reserve(body.len() + 3);
    buf.put_u8(prefix);
    buf.extend_from_slice(body);
    buf.extend_from_slice(b"\r\n");
}

/// A reusable RESP encoder.
///
/// Frames accumulate in an internal buffer until [`take`](Encoder::take) is
/// called, so one encoder serves a connection for its whole life.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: BytesMut,
}

impl Encoder {
    /// Creates a new encoder with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a frame into the internal buffer.
    pub fn encode(&mut self, frame: &Frame) {
        encode_frame(frame, &mut self.buf);
    }

    /// Takes the encoded bytes, leaving the encoder empty and reusable.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }
}
