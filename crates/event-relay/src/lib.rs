// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Store-and-forward relay for JSON event records.
//!
//! Records arrive over raw TCP connections, newline-delimited. Each record is stamped with
//! an arrival timestamp and POSTed to a single HTTP sink. Records the sink does not accept are
//! appended to a durable spool file which a background loop drains and redelivers on a fixed
//! schedule, giving at-least-once delivery while the sink is unavailable.
//!
//! ```text
//!   TCP conn ──> IngestHandler ──> augment ──> DeliveryClient ──> sink
//!                                                   │ failure
//!                                                   v
//!                                                 Spool <──── RetryLoop (drain + redeliver)
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod delivery;
pub mod errors;
pub mod http_utils;
pub mod ingest;
pub mod record;
pub mod retry;
pub mod server;
pub mod service;
pub mod spool;
