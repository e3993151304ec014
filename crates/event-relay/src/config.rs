// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use crate::ingest::{DEFAULT_MAX_PAYLOAD_BYTES, DEFAULT_READ_TIMEOUT};
use crate::retry::{RetryPolicy, RetryStrategy, DEFAULT_MAX_RETRY_INTERVAL, DEFAULT_RETRY_INTERVAL};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_CONNECTIONS: usize = 1024;

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address the TCP listener binds to
    pub listen_host: String,
    /// TCP port for incoming records, 0 lets the OS pick one
    pub listen_port: u16,
    /// Absolute URL every record is POSTed to
    pub endpoint_url: String,
    /// File holding records waiting for redelivery
    pub retry_file: PathBuf,
    /// Bound on each POST, connect included
    pub delivery_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// Connections handled at the same time; further connections wait to be accepted
    pub max_connections: usize,
    /// Bytes accepted from a single connection
    pub max_payload_bytes: usize,
    /// Time a peer gets to close its connection before it is discarded
    pub read_timeout: Duration,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log filter directive, a level (e.g., debug) or per-target directives
    /// (e.g., event_relay=debug). Parsed by the binary when it installs the subscriber.
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: 0,
            endpoint_url: String::new(),
            retry_file: PathBuf::new(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// `LISTEN_PORT`, `ENDPOINT_URL` and `RETRY_FILE` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_port = parse_value("LISTEN_PORT", &required("LISTEN_PORT")?)?;
        let endpoint_url = required("ENDPOINT_URL")?.trim().to_string();
        let retry_file = PathBuf::from(required("RETRY_FILE")?);

        let listen_host =
            env::var("LISTEN_HOST").unwrap_or_else(|_| DEFAULT_LISTEN_HOST.to_string());
        let delivery_timeout = Duration::from_secs(optional(
            "DELIVERY_TIMEOUT_SECS",
            DEFAULT_DELIVERY_TIMEOUT.as_secs(),
        )?);
        let retry_policy = RetryPolicy {
            interval: Duration::from_secs(optional(
                "RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL.as_secs(),
            )?),
            strategy: optional("RETRY_BACKOFF", RetryStrategy::Fixed)?,
            max_interval: Duration::from_secs(optional(
                "RETRY_MAX_INTERVAL_SECS",
                DEFAULT_MAX_RETRY_INTERVAL.as_secs(),
            )?),
            max_attempts: match env::var("RETRY_MAX_ATTEMPTS") {
                Ok(val) => Some(parse_value("RETRY_MAX_ATTEMPTS", &val)?),
                Err(_) => None,
            },
        };
        let max_connections = optional("MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let max_payload_bytes = optional("MAX_PAYLOAD_BYTES", DEFAULT_MAX_PAYLOAD_BYTES)?;
        let read_timeout = Duration::from_secs(optional(
            "READ_TIMEOUT_SECS",
            DEFAULT_READ_TIMEOUT.as_secs(),
        )?);
        let https_proxy = env::var("HTTPS_PROXY")
            .or_else(|_| env::var("https_proxy"))
            .ok();
        let log_level = env::var("LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            listen_host,
            listen_port,
            endpoint_url,
            retry_file,
            delivery_timeout,
            retry_policy,
            max_connections,
            max_payload_bytes,
            read_timeout,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint_url.is_empty() {
            return Err(ConfigError::Missing("ENDPOINT_URL"));
        }
        match reqwest::Url::parse(&self.endpoint_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(invalid(
                    "ENDPOINT_URL",
                    format!("unsupported scheme '{}'", url.scheme()),
                ))
            }
            Err(e) => return Err(invalid("ENDPOINT_URL", e.to_string())),
        }

        if self.retry_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("RETRY_FILE"));
        }

        if self.listen_host.trim().is_empty() {
            return Err(invalid("LISTEN_HOST", "cannot be empty"));
        }

        if self.delivery_timeout.is_zero() {
            return Err(invalid("DELIVERY_TIMEOUT_SECS", "must be greater than 0"));
        }
        if self.retry_policy.interval.is_zero() {
            return Err(invalid("RETRY_INTERVAL_SECS", "must be greater than 0"));
        }
        if self.retry_policy.max_attempts == Some(0) {
            return Err(invalid("RETRY_MAX_ATTEMPTS", "must be greater than 0"));
        }
        if self.max_connections == 0 {
            return Err(invalid("MAX_CONNECTIONS", "must be greater than 0"));
        }
        if self.max_payload_bytes == 0 {
            return Err(invalid("MAX_PAYLOAD_BYTES", "must be greater than 0"));
        }
        if self.read_timeout.is_zero() {
            return Err(invalid("READ_TIMEOUT_SECS", "must be greater than 0"));
        }

        Ok(())
    }

    /// `host:port` the listener binds to.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn optional<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(var) {
        Ok(val) => parse_value(var, &val),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(var: &'static str, val: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    val.trim()
        .parse()
        .map_err(|e| invalid(var, format!("'{val}': {e}")))
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}
