use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;
use bytes::Bytes;

/// A command ready to be sent to a node.
///
/// Commands are built using the builder pattern and converted to frames
/// for transmission over the connection.
///
/// # Example
///
/// ```
/// use slotcache::core::command::{set_ex, Cmd};
///
/// let cmd = Cmd::new("HSET").arg("user:1").arg("name").arg("ada");
/// let setex = set_ex("session:1", "token", 3600);
/// ```
#[derive(Debug, Clone)]
pub struct Cmd {
    args: Vec<Bytes>,
}

impl Cmd {
    /// Creates a new command with the given name.
    #[inline]
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            args: vec![name.into()],
        }
    }

    /// Appends an argument to the command.
    #[inline]
    pub fn arg<T: Into<Bytes>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Returns the command name as sent on the wire.
    pub fn name(&self) -> &[u8] {
        &self.args[0]
    }

    /// Converts the command to a RESP Array frame.
    #[inline]
    pub fn into_frame(self) -> Frame {
        Frame::Array(self.args.into_iter().map(Frame::bulk).collect())
    }
}

/// Creates a PING command, used as the pool liveness probe.
#[inline]
pub fn ping() -> Cmd {
    Cmd::new("PING")
}

/// Creates an AUTH command with password only.
#[inline]
pub fn auth(password: impl Into<Bytes>) -> Cmd {
    Cmd::new("AUTH").arg(password)
}

/// Creates a SELECT command.
#[inline]
pub fn select(db: u32) -> Cmd {
    Cmd::new("SELECT").arg(db.to_string())
}

/// Creates a GET command.
#[inline]
pub fn get(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("GET").arg(key)
}

/// Creates a `SET key value EX seconds` command.
#[inline]
pub fn set_ex(key: impl Into<Bytes>, value: impl Into<Bytes>, seconds: u64) -> Cmd {
    Cmd::new("SET")
        .arg(key)
        .arg(value)
        .arg("EX")
        .arg(seconds.to_string())
}

/// Creates a DEL command.
#[inline]
pub fn del(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("DEL").arg(key)
}

/// Creates an EXPIRE command.
#[inline]
pub fn expire(key: impl Into<Bytes>, seconds: u64) -> Cmd {
    Cmd::new("EXPIRE").arg(key).arg(seconds.to_string())
}

/// Creates an HSET command for a single field.
#[inline]
pub fn hset(key: impl Into<Bytes>, field: impl Into<Bytes>, value: impl Into<Bytes>) -> Cmd {
    Cmd::new("HSET").arg(key).arg(field).arg(value)
}

/// Creates an HGET command.
#[inline]
pub fn hget(key: impl Into<Bytes>, field: impl Into<Bytes>) -> Cmd {
    Cmd::new("HGET").arg(key).arg(field)
}

/// Creates an HMSET command.
pub fn hmset<F, V>(key: impl Into<Bytes>, fields: impl IntoIterator<Item = (F, V)>) -> Cmd
where
    F: Into<Bytes>,
    V: Into<Bytes>,
{
    fields
        .into_iter()
        .fold(Cmd::new("HMSET").arg(key), |cmd, (field, value)| {
            cmd.arg(field).arg(value)
        })
}

/// Creates an HMGET command.
pub fn hmget<F: Into<Bytes>>(key: impl Into<Bytes>, fields: impl IntoIterator<Item = F>) -> Cmd {
    fields
        .into_iter()
        .fold(Cmd::new("HMGET").arg(key), |cmd, field| cmd.arg(field))
}

fn server_error(e: Vec<u8>) -> Error {
    Error::Server {
        message: String::from_utf8_lossy(&e).into_owned(),
    }
}

fn bytes_to_string(data: Bytes) -> Result<String> {
    String::from_utf8(data.to_vec()).map_err(|_| Error::protocol("reply is not valid UTF-8"))
}

/// Converts an integer reply.
#[inline]
pub fn frame_to_int(frame: Frame) -> Result<i64> {
    match frame {
        Frame::Integer(i) => Ok(i),
        Frame::Error(e) => Err(server_error(e)),
        other => Err(Error::protocol(format!(
            "expected integer reply, got {:?}",
            other
        ))),
    }
}

/// Converts a status reply and checks it is `OK` (case-insensitive).
#[inline]
pub fn frame_to_ok(frame: Frame) -> Result<()> {
    match frame {
        Frame::SimpleString(s) if s.eq_ignore_ascii_case(b"OK") => Ok(()),
        Frame::BulkString(Some(b)) if b.eq_ignore_ascii_case(b"OK") => Ok(()),
        Frame::Error(e) => Err(server_error(e)),
        other => Err(Error::protocol(format!(
            "unexpected redis response {:?}",
            other
        ))),
    }
}

/// Converts a bulk string reply; the nil reply becomes `None`.
#[inline]
pub fn frame_to_optional_string(frame: Frame) -> Result<Option<String>> {
    match frame {
        Frame::BulkString(Some(b)) => bytes_to_string(b).map(Some),
        Frame::SimpleString(s) => bytes_to_string(Bytes::from(s)).map(Some),
        Frame::BulkString(None) | Frame::Null => Ok(None),
        Frame::Error(e) => Err(server_error(e)),
        other => Err(Error::protocol(format!(
            "expected bulk string reply, got {:?}",
            other
        ))),
    }
}

/// Converts an array reply of bulk strings, keeping nil entries as `None`.
#[inline]
pub fn frame_to_vec_optional_string(frame: Frame) -> Result<Vec<Option<String>>> {
    match frame {
        Frame::Array(items) => items.into_iter().map(frame_to_optional_string).collect(),
        Frame::Null => Ok(Vec::new()),
        Frame::Error(e) => Err(server_error(e)),
        other => Err(Error::protocol(format!(
            "expected array reply, got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: Cmd) -> Vec<Frame> {
        match cmd.into_frame() {
            Frame::Array(items) => items,
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_set_ex_cmd() {
        assert_eq!(
            args(set_ex("k", "v", 3600)),
            vec![
                Frame::bulk("SET"),
                Frame::bulk("k"),
                Frame::bulk("v"),
                Frame::bulk("EX"),
                Frame::bulk("3600"),
            ]
        );
    }

    #[test]
    fn test_hmset_cmd_flattens_pairs() {
        let cmd = hmset("h", vec![("a", "1"), ("b", "2")]);
        assert_eq!(cmd.name(), b"HMSET");
        assert_eq!(
            args(cmd),
            vec![
                Frame::bulk("HMSET"),
                Frame::bulk("h"),
                Frame::bulk("a"),
                Frame::bulk("1"),
                Frame::bulk("b"),
                Frame::bulk("2"),
            ]
        );
    }

    #[test]
    fn test_hmget_cmd_keeps_field_order() {
        assert_eq!(
            args(hmget("h", ["z", "a", "m"])),
            vec![
                Frame::bulk("HMGET"),
                Frame::bulk("h"),
                Frame::bulk("z"),
                Frame::bulk("a"),
                Frame::bulk("m"),
            ]
        );
    }

    #[test]
    fn test_expire_and_select_cmd() {
        assert_eq!(
            args(expire("k", 60)),
            vec![Frame::bulk("EXPIRE"), Frame::bulk("k"), Frame::bulk("60")]
        );
        assert_eq!(args(select(2)), vec![Frame::bulk("SELECT"), Frame::bulk("2")]);
    }

    #[test]
    fn test_frame_to_ok() {
        assert!(frame_to_ok(Frame::SimpleString(b"OK".to_vec())).is_ok());
        assert!(frame_to_ok(Frame::SimpleString(b"ok".to_vec())).is_ok());
        assert!(matches!(
            frame_to_ok(Frame::SimpleString(b"QUEUED".to_vec())),
            Err(Error::Protocol { .. })
        ));
        assert!(matches!(
            frame_to_ok(Frame::Error(b"ERR wrong".to_vec())),
            Err(Error::Server { .. })
        ));
    }

    #[test]
    fn test_frame_to_int() {
        assert_eq!(frame_to_int(Frame::Integer(2)).unwrap(), 2);
        assert!(matches!(
            frame_to_int(Frame::bulk("2")),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_frame_to_optional_string() {
        assert_eq!(
            frame_to_optional_string(Frame::bulk("v")).unwrap(),
            Some("v".to_string())
        );
        assert_eq!(frame_to_optional_string(Frame::BulkString(None)).unwrap(), None);
        assert!(frame_to_optional_string(Frame::bulk(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn test_frame_to_vec_optional_string() {
        let frame = Frame::Array(vec![Frame::bulk("a"), Frame::BulkString(None)]);
        assert_eq!(
            frame_to_vec_optional_string(frame).unwrap(),
            vec![Some("a".to_string()), None]
        );
    }
}
