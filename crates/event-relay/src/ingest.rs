// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-connection ingest: read the whole stream, split it into newline-delimited records and
//! push each record through augmentation and delivery.
//!
//! Records are handled one at a time in the order they appear on the connection. A record
//! that is not a JSON object is logged and skipped; it never reaches the sink or the spool.
//! A record the sink does not accept is appended to the spool.

use crate::delivery::{DeliveryClient, DeliveryOutcome};
use crate::record::augment;
use crate::spool::Spool;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, error, trace, warn};

/// Upper bound on the bytes accepted from a single connection.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB in Bytes
/// Time a peer gets to send its records and close the stream.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// What happened to the records of one connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    /// Accepted by the sink on the first attempt.
    pub delivered: usize,
    /// Rejected or unreachable sink, saved for retry.
    pub spooled: usize,
    /// Not a JSON object. Skipped.
    pub malformed: usize,
    /// Delivery failed and the spool could not be written. Lost.
    pub dropped: usize,
}

impl IngestSummary {
    #[must_use]
    pub fn records(&self) -> usize {
        self.delivered + self.spooled + self.malformed + self.dropped
    }
}

#[derive(Debug, Clone)]
pub struct IngestHandler {
    client: DeliveryClient,
    spool: Arc<Spool>,
    max_payload_bytes: usize,
    read_timeout: Duration,
}

impl IngestHandler {
    #[must_use]
    pub fn new(
        client: DeliveryClient,
        spool: Arc<Spool>,
        max_payload_bytes: usize,
        read_timeout: Duration,
    ) -> Self {
        IngestHandler {
            client,
            spool,
            max_payload_bytes,
            read_timeout,
        }
    }

    /// Reads `reader` to end of stream and processes every record in it.
    ///
    /// Nothing is reported back to the peer. A read error, an oversized stream or a peer that
    /// does not close within the read timeout discards the whole connection.
    pub async fn handle<R>(&self, reader: R, peer: &str) -> IngestSummary
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        let limit = self.max_payload_bytes as u64 + 1;
        match timeout(self.read_timeout, reader.take(limit).read_to_end(&mut buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!("Error reading from connection {}: {}", peer, e);
                return IngestSummary::default();
            }
            Err(_) => {
                error!(
                    "Connection {} did not close within {} ms, discarding it",
                    peer,
                    self.read_timeout.as_millis()
                );
                return IngestSummary::default();
            }
        }
        if buf.len() > self.max_payload_bytes {
            error!(
                "Connection {} sent more than {} bytes, discarding it",
                peer, self.max_payload_bytes
            );
            return IngestSummary::default();
        }

        trace!("Received {} bytes from {}", buf.len(), peer);
        let summary = self.process(&buf).await;
        debug!("Connection {} done: {:?}", peer, summary);
        summary
    }

    /// Processes newline-delimited records already read from a connection.
    pub async fn process(&self, buf: &[u8]) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for line in buf.split(|b| *b == b'\n') {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let payload = match augment(line) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Skipping malformed record: {}", e);
                    summary.malformed += 1;
                    continue;
                }
            };

            match self.client.deliver(&payload).await {
                DeliveryOutcome::Delivered => summary.delivered += 1,
                failure => {
                    warn!("Error forwarding record ({}), saving it for retry", failure);
                    match self.spool.append(&payload).await {
                        Ok(()) => summary.spooled += 1,
                        Err(e) => {
                            error!("{}. Record dropped", e);
                            summary.dropped += 1;
                        }
                    }
                }
            }
        }

        summary
    }
}
