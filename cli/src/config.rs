//! Configuration management for the flash sale binaries.
//!
//! Loads configuration from environment variables with sensible defaults.
//! The binaries load a `.env` file (via `dotenvy`) before calling
//! [`Config::from_env`].

use flashsale_core::event::DEFAULT_EVENT_CHANNEL;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Store address used when neither `REDIS_URL` nor `REDIS_ADDR` is set.
pub const DEFAULT_REDIS_ADDR: &str = "localhost:6379";

/// Listen address used when `LISTEN_ADDR` is not set.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Read timeout (seconds) used when `READ_TIMEOUT_SECS` is not set.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// An environment variable held a value that could not be used.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value for {key}: {value:?}")]
pub struct ConfigError {
    /// Variable name
    pub key: &'static str,
    /// Offending value
    pub value: String,
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Redis connection URL (`REDIS_URL`, or `redis://` + `REDIS_ADDR`)
    pub redis_url: String,
    /// TCP listen address (`LISTEN_ADDR`)
    pub listen_addr: String,
    /// Rolling per-read inactivity timeout (`READ_TIMEOUT_SECS`)
    pub read_timeout: Duration,
    /// Bound on each store round-trip (`STORE_TIMEOUT_MS`); `None` is unbounded
    pub store_timeout: Option<Duration>,
    /// Pub/sub channel for purchase events (`EVENT_CHANNEL`)
    pub event_channel: String,
    /// Prometheus listener (`METRICS_ADDR`); `None` disables the exporter
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric or address variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric or address variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read_timeout_secs =
            parse_var(&lookup, "READ_TIMEOUT_SECS")?.unwrap_or(DEFAULT_READ_TIMEOUT_SECS);
        if read_timeout_secs == 0 {
            return Err(ConfigError {
                key: "READ_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            redis_url: redis_url(&lookup),
            listen_addr: listen_addr(
                &lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            ),
            read_timeout: Duration::from_secs(read_timeout_secs),
            store_timeout: parse_var(&lookup, "STORE_TIMEOUT_MS")?.map(Duration::from_millis),
            event_channel: lookup("EVENT_CHANNEL")
                .unwrap_or_else(|| DEFAULT_EVENT_CHANNEL.to_string()),
            metrics_addr: parse_var(&lookup, "METRICS_ADDR")?,
        })
    }
}

/// Resolve the Redis URL: `REDIS_URL` wins, then `REDIS_ADDR`, then the default.
pub fn redis_url(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup("REDIS_URL").unwrap_or_else(|| {
        let addr = lookup("REDIS_ADDR").unwrap_or_else(|| DEFAULT_REDIS_ADDR.to_string());
        format!("redis://{addr}")
    })
}

/// A bare `:port` listens on all interfaces.
fn listen_addr(raw: &str) -> String {
    if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { key, value }),
    }
}
