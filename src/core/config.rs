//! Cluster configuration and environment-suffixed config file lookup.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::proto::error::{Error, Result};

/// Environment variable naming the deployment environment.
pub const ENVIRONMENT_VAR: &str = "MYENV";

/// Environment used when [`ENVIRONMENT_VAR`] is unset or empty.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Everything needed to reach and pool a Redis Cluster.
///
/// Durations are stored as integers with the unit in the field name. A zero
/// in any of the dial fields (`connect_timeout_ms`, `read_timeout_ms`,
/// `write_timeout_ms`, `database`, `keep_alive_secs`, `password`) leaves the
/// corresponding option unset.
///
/// Deserializes from INI or TOML with every field optional:
///
/// ```ini
/// host = 10.0.0.5:7000
/// max_active = 32
/// read_timeout_ms = 500
/// retry_count = 3
/// retry_delay_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Seed node, `host:port` or `redis://host:port`.
    pub host: String,
    /// Maximum leased connections per node. 0 means unbounded.
    pub max_active: usize,
    /// Maximum idle connections kept per node.
    pub max_idle: usize,
    /// Idle connections older than this are closed. 0 disables expiry.
    pub idle_timeout_secs: u64,
    /// How long to wait for a free connection. 0 waits indefinitely.
    pub wait_timeout_ms: u64,
    /// TCP connect timeout.
    pub connect_timeout_ms: u64,
    /// Per-reply read timeout.
    pub read_timeout_ms: u64,
    /// Per-request write timeout.
    pub write_timeout_ms: u64,
    /// Logical database selected after connecting.
    pub database: u32,
    /// TCP keep-alive interval.
    pub keep_alive_secs: u64,
    /// AUTH password.
    pub password: String,
    /// Retries after the first attempt of each command.
    pub retry_count: u32,
    /// Delay before each retry.
    pub retry_delay_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1:6379".to_string(),
            max_active: 10,
            max_idle: 5,
            idle_timeout_secs: 240,
            wait_timeout_ms: 0,
            connect_timeout_ms: 0,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            database: 0,
            keep_alive_secs: 0,
            password: String::new(),
            retry_count: 3,
            retry_delay_ms: 100,
        }
    }
}

impl ClusterConfig {
    /// Idle expiry, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero(Duration::from_secs(self.idle_timeout_secs))
    }

    /// Pool wait bound, `None` to wait indefinitely.
    pub fn wait_timeout(&self) -> Option<Duration> {
        non_zero(Duration::from_millis(self.wait_timeout_ms))
    }

    /// Delay slept before each retry.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

pub(crate) fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}

/// Config file formats, probed in this order within each search path.
const FORMATS: [Format; 2] = [Format::Ini, Format::Toml];

#[derive(Debug, Clone, Copy)]
enum Format {
    Ini,
    Toml,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Ini => "ini",
            Format::Toml => "toml",
        }
    }

    fn parse<T: DeserializeOwned>(self, content: &str) -> std::result::Result<T, String> {
        match self {
            Format::Ini => serde_ini::from_str(content).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

/// Loads `<module>.<env>.ini` (or `.toml`) from the first search path that
/// has a readable, parseable candidate.
///
/// The environment comes from `MYENV` and defaults to `development`.
pub fn load_module_config<T, P>(module: &str, search_paths: &[P]) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let environment = env::var(ENVIRONMENT_VAR)
        .ok()
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string());
    load_module_config_for(module, &environment, search_paths)
}

/// Same as [`load_module_config`] with an explicit environment.
///
/// Within one search path the `.ini` file wins over the `.toml` one.
pub fn load_module_config_for<T, P>(module: &str, environment: &str, search_paths: &[P]) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let mut searched = Vec::with_capacity(search_paths.len() * FORMATS.len());

    for dir in search_paths {
        for format in FORMATS {
            let file_name = format!("{}.{}.{}", module, environment, format.extension());
            let candidate = dir.as_ref().join(file_name);
            match read_candidate(&candidate, format) {
                Ok(config) => {
                    debug!(path = %candidate.display(), "loaded module config");
                    return Ok(config);
                }
                Err(reason) => {
                    warn!(path = %candidate.display(), %reason, "skipping config candidate");
                    searched.push(candidate);
                }
            }
        }
    }

    Err(Error::ConfigLookup {
        module: module.to_string(),
        environment: environment.to_string(),
        searched,
    })
}

fn read_candidate<T: DeserializeOwned>(path: &Path, format: Format) -> std::result::Result<T, String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    format.parse(&content)
}
