//! Bounded retry around a leased connection.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::core::command::{frame_to_ok, Cmd};
use crate::proto::error::Result;
use crate::proto::frame::Frame;

use super::commands::asking;
use super::errors::{parse_redis_error, RetryAction};
use super::pool::PooledConnection;
use super::router::Router;
use super::slot::key_slot;

/// Where the next attempt goes after a redirect.
struct Redirect {
    address: String,
    asking: bool,
}

/// A connection bound to one key's slot that retries failed commands.
///
/// Lives for one logical operation. Each command gets at most
/// `retry_count + 1` attempts and `retry_delay` is slept before every retry.
/// Redirects, transient cluster states and connection failures are retried,
/// everything else is returned at once. When the attempts run out the last
/// error is returned as is.
pub(crate) struct RetryConnection<'a> {
    router: &'a Router,
    slot: u16,
    conn: Option<PooledConnection>,
    retry_count: u32,
    retry_delay: Duration,
}

impl<'a> RetryConnection<'a> {
    /// Leases a connection to the node serving `key`.
    ///
    /// A failure here is returned without retrying.
    pub(crate) async fn bind(
        router: &'a Router,
        key: &str,
        retry_count: u32,
        retry_delay: Duration,
    ) -> Result<RetryConnection<'a>> {
        let slot = key_slot(key);
        let conn = router.connection_for_slot(slot).await?;
        Ok(Self {
            router,
            slot,
            conn: Some(conn),
            retry_count,
            retry_delay,
        })
    }

    /// Runs `cmd`, retrying per the redirect and failure rules.
    ///
    /// Error replies are parsed into typed errors; any other reply is
    /// returned for the caller to convert.
    #[instrument(skip_all, fields(command = %String::from_utf8_lossy(cmd.name()), slot = self.slot))]
    pub(crate) async fn execute(&mut self, cmd: Cmd) -> Result<Frame> {
        let frame = cmd.into_frame();
        let mut redirect = None;
        let mut retries = 0;

        loop {
            let error = match self.attempt(&frame, redirect.take()).await {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };

            let action = RetryAction::for_error(&error);
            if action == RetryAction::Fail || retries >= self.retry_count {
                return Err(error);
            }
            retries += 1;
            warn!(retry = retries, error = %error, "command failed, retrying");

            // Release before refreshing so a full pool cannot block the refresh.
            self.conn = None;
            tokio::time::sleep(self.retry_delay).await;

            redirect = match action {
                RetryAction::Moved(address) => {
                    self.router.refresh_best_effort().await;
                    Some(Redirect {
                        address,
                        asking: false,
                    })
                }
                RetryAction::Ask(address) => Some(Redirect {
                    address,
                    asking: true,
                }),
                RetryAction::Refresh | RetryAction::Reconnect => {
                    self.router.refresh_best_effort().await;
                    None
                }
                RetryAction::Reroute | RetryAction::Fail => None,
            };
        }
    }

    async fn attempt(&mut self, frame: &Frame, redirect: Option<Redirect>) -> Result<Frame> {
        let reply = match redirect {
            Some(Redirect {
                address,
                asking: true,
            }) => {
                // The ASK target only serves this one command.
                debug!(address = %address, "following ASK redirect");
                let mut conn = self.router.connection_for_address(&address).await?;
                frame_to_ok(conn.send(asking()).await?)?;
                conn.request(frame).await?
            }
            Some(Redirect {
                address,
                asking: false,
            }) => {
                debug!(address = %address, "following MOVED redirect");
                let conn = self.router.connection_for_address(&address).await?;
                self.conn.insert(conn).request(frame).await?
            }
            None => {
                let conn = match self.conn.take() {
                    Some(conn) => conn,
                    None => self.router.connection_for_slot(self.slot).await?,
                };
                self.conn.insert(conn).request(frame).await?
            }
        };

        match reply {
            Frame::Error(message) => Err(parse_redis_error(&message)),
            reply => Ok(reply),
        }
    }
}

impl std::fmt::Debug for RetryConnection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConnection")
            .field("slot", &self.slot)
            .field("conn", &self.conn)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}
