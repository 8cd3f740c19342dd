use bytes::{Buf, Bytes, BytesMut};

use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024 * 1024; // 512 MB

/// A streaming RESP decoder.
///
/// Bytes are appended as they arrive from the socket. [`decode`](Decoder::decode)
/// only consumes input once a whole frame is available, so a reply split
/// across several reads (including nested arrays) is never lost.
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl Decoder {
    /// Creates a new decoder with an empty buffer.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Creates a decoder that rejects frames larger than `max_frame_size` bytes.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Appends raw bytes to the internal buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Returns the internal buffer so a reader can fill it in place.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Attempts to decode one frame.
    ///
    /// Returns `Ok(None)` when more data is needed and `Err` when the input
    /// is malformed or exceeds the size limit.
    pub fn decode(&mut self) -> Result<Option<Frame>> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut pos = 0;
        match self.parse(&mut pos)? {
            Some(frame) => {
                self.buf.advance(pos);
                Ok(Some(frame))
            }
            None if self.buf.len() > self.max_frame_size => Err(Error::protocol(
                "buffered frame exceeds maximum frame size",
            )),
            None => Ok(None),
        }
    }

    fn parse(&self, pos: &mut usize) -> Result<Option<Frame>> {
        let Some(line) = self.line(pos)? else {
            return Ok(None);
        };
        let (kind, body) = (line[0], &line[1..]);

        let frame = match kind {
            b'+' => Frame::SimpleString(body.to_vec()),
            b'-' => Frame::Error(body.to_vec()),
            b':' => Frame::Integer(parse_int(body)?),
            b'$' => {
                let len = parse_int(body)?;
                if len < 0 {
                    return Ok(Some(Frame::BulkString(None)));
                }
                let len = len as usize;
                if len > self.max_frame_size {
                    return Err(Error::protocol("bulk string exceeds maximum frame size"));
                }
                if self.buf.len() < *pos + len + 2 {
                    return Ok(None);
                }
                if &self.buf[*pos + len..*pos + len + 2] != b"\r\n" {
                    return Err(Error::protocol("bulk string missing terminator"));
                }
                let data = Bytes::copy_from_slice(&self.buf[*pos..*pos + len]);
                *pos += len + 2;
                Frame::BulkString(Some(data))
            }
            b'*' => {
                let len = parse_int(body)?;
                if len < 0 {
                    return Ok(Some(Frame::Null));
                }
                let len = len as usize;
                // every element needs at least three bytes
                if len > self.max_frame_size / 3 {
                    return Err(Error::protocol("array length exceeds maximum frame size"));
                }
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    match self.parse(pos)? {
                        Some(item) => items.push(item),
                        None => return Ok(None),
                    }
                }
                Frame::Array(items)
            }
            other => {
                return Err(Error::protocol(format!(
                    "unknown frame type byte: {:?}",
                    other as char
                )))
            }
        };
        Ok(Some(frame))
    }

    /// Returns the line starting at `pos` without its CRLF and moves `pos`
    /// past it, or `None` if the line is not complete yet.
    fn line(&self, pos: &mut usize) -> Result<Option<&[u8]>> {
        let start = *pos;
        let rest = &self.buf[start..];
        let Some(end) = rest.windows(2).position(|w| w == b"\r\n") else {
            return Ok(None);
        };
        if end == 0 {
            return Err(Error::protocol("empty frame header"));
        }
        *pos = start + end + 2;
        Ok(Some(&rest[..end]))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_int(body: &[u8]) -> Result<i64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            Error::protocol(format!(
                "invalid integer: {:?}",
                String::from_utf8_lossy(body)
            ))
        })
}
