use bytes::Bytes;

/// A RESP2 frame.
///
/// Covers the reply shapes a cluster node can send back and the array of
/// bulk strings every request is encoded as.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Simple string (+OK).
    SimpleString(Vec<u8>),
    /// Error (-ERR).
    Error(Vec<u8>),
    /// Integer (:1000).
    Integer(i64),
    /// Bulk string ($6\r\nfoobar). `None` is the nil bulk string ($-1).
    BulkString(Option<Bytes>),
    /// Array (*2\r\n...).
    Array(Vec<Frame>),
    /// Nil array (*-1).
    Null,
}

impl Frame {
    /// Builds a bulk string frame from anything convertible into `Bytes`.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::BulkString(Some(data.into()))
    }

    /// Returns true for both nil encodings (`$-1` and `*-1`).
    pub fn is_nil(&self) -> bool {
        matches!(self, Frame::Null | Frame::BulkString(None))
    }

    /// Returns the error message if this is an error frame.
    pub fn as_error(&self) -> Option<&[u8]> {
        match self {
            Frame::Error(e) => Some(e),
            _ => None,
        }
    }
}
