use std::time::Duration;

use crate::core::config::{non_zero, ClusterConfig};

/// One connection-establishment setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialOption {
    /// Bound on the TCP connect.
    ConnectTimeout(Duration),
    /// Bound on each request write.
    WriteTimeout(Duration),
    /// Bound on each reply read.
    ReadTimeout(Duration),
    /// Logical database to `SELECT` after connecting.
    Database(u32),
    /// TCP keep-alive interval.
    KeepAlive(Duration),
    /// Password sent with `AUTH` after connecting.
    Password(String),
}

/// Translates a config into dial options.
///
/// Options come out in a fixed order and zero or empty fields are left out,
/// so the connection keeps its own default for them.
pub fn dial_options(config: &ClusterConfig) -> Vec<DialOption> {
    let mut options = Vec::with_capacity(6);

    if let Some(d) = non_zero(Duration::from_millis(config.connect_timeout_ms)) {
        options.push(DialOption::ConnectTimeout(d));
    }
    if let Some(d) = non_zero(Duration::from_millis(config.write_timeout_ms)) {
        options.push(DialOption::WriteTimeout(d));
    }
    if let Some(d) = non_zero(Duration::from_millis(config.read_timeout_ms)) {
        options.push(DialOption::ReadTimeout(d));
    }
    if config.database != 0 {
        options.push(DialOption::Database(config.database));
    }
    if let Some(d) = non_zero(Duration::from_secs(config.keep_alive_secs)) {
        options.push(DialOption::KeepAlive(d));
    }
    if !config.password.is_empty() {
        options.push(DialOption::Password(config.password.clone()));
    }

    options
}

/// Dial options folded into the settings a connection applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DialSettings {
    pub connect_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub database: Option<u32>,
    pub keep_alive: Option<Duration>,
    pub password: Option<String>,
}

impl DialSettings {
    pub fn from_options(options: &[DialOption]) -> Self {
        options
            .iter()
            .fold(Self::default(), |mut settings, option| {
                match option {
                    DialOption::ConnectTimeout(d) => settings.connect_timeout = Some(*d),
                    DialOption::WriteTimeout(d) => settings.write_timeout = Some(*d),
                    DialOption::ReadTimeout(d) => settings.read_timeout = Some(*d),
                    DialOption::Database(db) => settings.database = Some(*db),
                    DialOption::KeepAlive(d) => settings.keep_alive = Some(*d),
                    DialOption::Password(p) => settings.password = Some(p.clone()),
                }
                settings
            })
    }
}
