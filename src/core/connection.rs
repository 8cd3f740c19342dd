use std::fmt;
use std::future::Future;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::core::command::{self, Cmd};
use crate::core::dial::{DialOption, DialSettings};
use crate::proto::codec::{Decoder, Encoder};
use crate::proto::error::{Error, Result};
use crate::proto::frame::Frame;

/// A connection to a single cluster node.
///
/// Wraps a stream and handles RESP encoding and decoding. Requests are
/// strictly one at a time: the pool leases a connection to exactly one
/// command, so there is never more than one reply in flight.
///
/// After an IO error, timeout, or malformed reply the connection is marked
/// broken and the pool drops it instead of reusing it.
pub struct Connection<S = TcpStream> {
    stream: S,
    decoder: Decoder,
    encoder: Encoder,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    broken: bool,
}

impl Connection<TcpStream> {
    /// Opens a TCP connection to `address` and applies the dial options.
    ///
    /// The connect is bounded by the connect timeout, keep-alive is set on
    /// the socket, then `AUTH` and `SELECT` are sent when configured.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] / [`Error::Io`] if the node cannot be reached
    /// - [`Error::Auth`] if the password is rejected
    /// - [`Error::Protocol`] if AUTH or SELECT answers anything but `OK`
    /// - [`Error::Server`] if the database cannot be selected
    pub async fn dial(address: &str, options: &[DialOption]) -> Result<Self> {
        let settings = DialSettings::from_options(options);

        let stream = with_timeout(
            settings.connect_timeout,
            "connect",
            TcpStream::connect(address),
        )
        .await?
        .map_err(|e| Error::Io { source: e })?;
        stream.set_nodelay(true)?;

        if let Some(interval) = settings.keep_alive {
            let keepalive = TcpKeepalive::new().with_time(interval);
            SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;
        }

        let mut conn =
            Connection::new(stream).with_timeouts(settings.read_timeout, settings.write_timeout);

        if let Some(password) = settings.password {
            let reply = conn.request(&command::auth(password).into_frame()).await?;
            command::frame_to_ok(reply).map_err(|e| match e {
                Error::Server { .. } => Error::Auth,
                other => other,
            })?;
        }

        if let Some(db) = settings.database {
            let reply = conn.request(&command::select(db).into_frame()).await?;
            command::frame_to_ok(reply)?;
        }

        debug!(address, "dialed node");
        Ok(conn)
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection with the given stream and no timeouts.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            read_timeout: None,
            write_timeout: None,
            broken: false,
        }
    }

    /// Configures read and write timeouts for this connection.
    pub fn with_timeouts(
        mut self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Returns true once the connection has failed and must not be reused.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Sends one request frame and waits for its reply.
    ///
    /// Error replies from the node come back as `Ok(Frame::Error(..))`; only
    /// transport and decoding failures are `Err`.
    pub async fn request(&mut self, frame: &Frame) -> Result<Frame> {
        if self.broken {
            return Err(Error::ConnectionClosed);
        }
        let result = match self.write_frame(frame).await {
            Ok(()) => self.read_frame().await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    /// Sends a command built with [`Cmd`].
    pub async fn send(&mut self, cmd: Cmd) -> Result<Frame> {
        self.request(&cmd.into_frame()).await
    }

    pub(crate) async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.encoder.encode(frame);
        let data = self.encoder.take();
        let timeout = self.write_timeout;
        with_timeout(timeout, "write", async {
            self.stream.write_all(&data).await?;
            self.stream.flush().await
        })
        .await??;
        Ok(())
    }

    pub(crate) async fn read_frame(&mut self) -> Result<Frame> {
        let timeout = self.read_timeout;
        with_timeout(timeout, "read", async {
            loop {
                if let Some(frame) = self.decoder.decode()? {
                    return Ok(frame);
                }
                let n = self.stream.read_buf(self.decoder.buffer_mut()).await?;
                if n == 0 {
                    return Err(Error::ConnectionClosed);
                }
            }
        })
        .await?
    }
}

async fn with_timeout<F, T>(limit: Option<Duration>, operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = T>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout { operation }),
        None => Ok(fut.await),
    }
}

impl<S> fmt::Debug for Connection<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("broken", &self.broken)
            .finish()
    }
}
