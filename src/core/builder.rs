use std::time::Duration;

use crate::core::config::ClusterConfig;
use crate::{Cluster, Error, Result};

/// Builder for configuring and creating a [`Cluster`] handle.
///
/// Every setter maps to one [`ClusterConfig`] field; unset fields keep the
/// config defaults.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use slotcache::ClusterBuilder;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let cluster = ClusterBuilder::new()
///     .host("redis://127.0.0.1:7000")
///     .password("secret")
///     .max_active(32)
///     .read_timeout(Duration::from_millis(500))
///     .retry(3, Duration::from_millis(100))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ClusterBuilder {
    host: Option<String>,
    config: ClusterConfig,
}

impl ClusterBuilder {
    /// Creates a new [`ClusterBuilder`] instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing config, host included.
    pub fn from_config(config: ClusterConfig) -> Self {
        Self {
            host: Some(config.host.clone()),
            config,
        }
    }

    /// Sets the seed node(s).
    ///
    /// # Arguments
    ///
    /// * `host` - `host:port` or `redis://host:port`, comma-separated for
    ///   several seeds
    #[inline]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the password sent with `AUTH` on every new connection.
    #[inline]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Sets the database selected on every new connection.
    #[inline]
    pub fn database(mut self, database: u32) -> Self {
        self.config.database = database;
        self
    }

    /// Sets the maximum leased connections per node. 0 means unbounded.
    #[inline]
    pub fn max_active(mut self, max_active: usize) -> Self {
        self.config.max_active = max_active;
        self
    }

    /// Sets how many idle connections each node pool keeps.
    #[inline]
    pub fn max_idle(mut self, max_idle: usize) -> Self {
        self.config.max_idle = max_idle;
        self
    }

    /// Sets how long a connection may sit idle before it is closed.
    ///
    /// Stored in whole seconds, rounded up; zero disables expiry.
    #[inline]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout_secs = secs(timeout);
        self
    }

    /// Sets how long an operation waits for a free connection.
    #[inline]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout_ms = millis(timeout);
        self
    }

    /// Sets the TCP connect timeout.
    #[inline]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = millis(timeout);
        self
    }

    /// Sets the timeout for reading each reply.
    #[inline]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_ms = millis(timeout);
        self
    }

    /// Sets the timeout for writing each request.
    #[inline]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout_ms = millis(timeout);
        self
    }

    /// Sets the TCP keep-alive interval.
    ///
    /// Stored in whole seconds, rounded up; zero leaves keep-alive off.
    #[inline]
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.config.keep_alive_secs = secs(interval);
        self
    }

    /// Sets the retry policy.
    ///
    /// # Arguments
    ///
    /// * `count` - Retries after the first attempt
    /// * `delay` - Sleep before each retry
    #[inline]
    pub fn retry(mut self, count: u32, delay: Duration) -> Self {
        self.config.retry_count = count;
        self.config.retry_delay_ms = millis(delay);
        self
    }

    /// Returns the config the builder would connect with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no host is set.
    pub fn config(&self) -> Result<ClusterConfig> {
        let host = self
            .host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::InvalidArgument {
                message: "host is required".to_string(),
            })?;
        Ok(ClusterConfig {
            host,
            ..self.config.clone()
        })
    }

    /// Connects to the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if no host is set, otherwise any
    /// error from [`Cluster::initialize`].
    pub async fn build(self) -> Result<Cluster> {
        Cluster::initialize(self.config()?).await
    }
}

// Round up so a non-zero duration never collapses to the "unset" zero.
fn millis(d: Duration) -> u64 {
    let ms = d.as_nanos().div_ceil(1_000_000);
    u64::try_from(ms).unwrap_or(u64::MAX)
}

fn secs(d: Duration) -> u64 {
    if d.subsec_nanos() == 0 {
        d.as_secs()
    } else {
        d.as_secs().saturating_add(1)
    }
}
