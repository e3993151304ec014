// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised while turning raw bytes into a timestamped record.
#[derive(Debug, thiserror::Error)]
pub enum AugmentError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("failed to serialize record: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Errors raised by the retry spool. The payload that triggered a `Write` error is lost.
#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("failed to write spool file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read spool file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to truncate spool file {}: {source}", path.display())]
    Truncate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration problems detected at startup. Always fatal.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Errors that prevent the relay from starting.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}
