// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-attempt delivery of a serialized record to the HTTP sink.
//!
//! The client never retries on its own: a failed attempt is reported to the caller, which
//! decides whether the payload goes to the spool.

use crate::errors::RelayError;
use crate::http_utils::build_client;
use core::time::Duration;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// Result of one POST to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink answered 200.
    Delivered,
    /// The sink answered with any other status, 2xx variants included.
    Rejected(StatusCode),
    /// No response: connection error, TLS error or timeout.
    Unreachable(String),
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryOutcome::Delivered => write!(f, "delivered"),
            DeliveryOutcome::Rejected(status) => write!(f, "rejected with status {status}"),
            DeliveryOutcome::Unreachable(reason) => write!(f, "sink unreachable: {reason}"),
        }
    }
}

/// POSTs records to the configured sink. Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    endpoint: String,
}

impl DeliveryClient {
    pub fn new(
        endpoint: String,
        https_proxy: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let client =
            build_client(https_proxy, timeout).map_err(|e| RelayError::HttpClient(e.to_string()))?;
        Ok(Self::with_client(client, endpoint))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: String) -> Self {
        DeliveryClient { client, endpoint }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `payload` as the body of a single `application/json` POST.
    pub async fn deliver(&self, payload: &[u8]) -> DeliveryOutcome {
        let time = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await;
        let elapsed = time.elapsed();

        match resp {
            Ok(resp) if resp.status() == StatusCode::OK => {
                debug!(
                    "Delivered {} bytes to {} in {} ms",
                    payload.len(),
                    self.endpoint,
                    elapsed.as_millis()
                );
                DeliveryOutcome::Delivered
            }
            Ok(resp) => {
                let status = resp.status();
                debug!(
                    "{}: Sink rejected record: {:?}",
                    status,
                    resp.text().await.unwrap_or_default()
                );
                DeliveryOutcome::Rejected(status)
            }
            Err(e) => {
                debug!(
                    "Failed to reach {} after {} ms: {:?}",
                    self.endpoint,
                    elapsed.as_millis(),
                    e
                );
                DeliveryOutcome::Unreachable(e.to_string())
            }
        }
    }
}
