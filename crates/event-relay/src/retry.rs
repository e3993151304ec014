// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background redelivery of spooled records.
//!
//! Every cycle drains the whole spool and tries each entry once, oldest first. An entry that
//! fails again is appended back to the spool right away, so it moves behind anything spooled
//! in the meantime and is retried on the next cycle. With the default [`RetryPolicy`] the loop
//! sleeps one minute between cycles and never gives up on an entry.
//!
//! ```text
//!   Idle -> Draining -> Redelivering -> Sleeping -> Idle
//!              │ read error                ^
//!              └───────────────────────────┘
//! ```

use crate::delivery::{DeliveryClient, DeliveryOutcome};
use crate::errors::SpoolError;
use crate::spool::Spool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_RETRY_INTERVAL: Duration = Duration::from_secs(3600);

/// How the sleep between cycles evolves while cycles keep failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    /// Always sleep `interval`.
    #[default]
    Fixed,
    /// Sleep `interval * (n + 1)` after `n` consecutive failing cycles.
    Linear,
    /// Sleep `interval * 2^n` after `n` consecutive failing cycles.
    Exponential,
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fixed" => Ok(RetryStrategy::Fixed),
            "linear" => Ok(RetryStrategy::Linear),
            "exponential" => Ok(RetryStrategy::Exponential),
            other => Err(format!(
                "unknown retry strategy '{other}', expected fixed, linear or exponential"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base sleep between cycles.
    pub interval: Duration,
    pub strategy: RetryStrategy,
    /// Cap for growing strategies. Ignored by `Fixed`.
    pub max_interval: Duration,
    /// Redelivery attempts after which an entry is dropped. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            interval: DEFAULT_RETRY_INTERVAL,
            strategy: RetryStrategy::Fixed,
            max_interval: DEFAULT_MAX_RETRY_INTERVAL,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Sleep before the next cycle, given how many cycles in a row had failures.
    #[must_use]
    pub fn next_delay(&self, failed_cycles: u32) -> Duration {
        let cap = self.max_interval.max(self.interval);
        match self.strategy {
            RetryStrategy::Fixed => self.interval,
            RetryStrategy::Linear => self
                .interval
                .saturating_mul(failed_cycles.saturating_add(1))
                .min(cap),
            RetryStrategy::Exponential => self
                .interval
                .saturating_mul(2_u32.saturating_pow(failed_cycles))
                .min(cap),
        }
    }
}

/// Counters for one drain-and-redeliver pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: usize,
    pub delivered: usize,
    pub respooled: usize,
    /// Out of attempts, or the spool could not be written.
    pub dropped: usize,
}

impl CycleReport {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.respooled > 0 || self.dropped > 0
    }
}

pub struct RetryLoop {
    spool: Arc<Spool>,
    client: DeliveryClient,
    policy: RetryPolicy,
    cancel_token: CancellationToken,
    // Only populated when the policy has a max_attempts.
    attempts: HashMap<Vec<u8>, u32>,
    failed_cycles: u32,
}

impl RetryLoop {
    #[must_use]
    pub fn new(
        spool: Arc<Spool>,
        client: DeliveryClient,
        policy: RetryPolicy,
        cancel_token: CancellationToken,
    ) -> Self {
        RetryLoop {
            spool,
            client,
            policy,
            cancel_token,
            attempts: HashMap::new(),
            failed_cycles: 0,
        }
    }

    /// Runs cycles until the cancel token fires.
    ///
    /// Cancellation is only observed while sleeping, so a cycle in progress always finishes
    /// and no drained entry is abandoned.
    pub async fn spin(mut self) {
        loop {
            match self.run_cycle().await {
                Ok(report) => {
                    if report.drained > 0 {
                        info!(
                            "Retry cycle: {} drained, {} delivered, {} respooled, {} dropped",
                            report.drained, report.delivered, report.respooled, report.dropped
                        );
                    }
                    if report.has_failures() {
                        self.failed_cycles = self.failed_cycles.saturating_add(1);
                    } else {
                        self.failed_cycles = 0;
                    }
                }
                Err(e) => error!("Skipping retry cycle: {}", e),
            }

            let delay = self.policy.next_delay(self.failed_cycles);
            debug!("Next retry cycle in {} ms", delay.as_millis());
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.cancel_token.cancelled() => {
                    debug!("Retry loop stopped");
                    return;
                }
            }
        }
    }

    /// Drains the spool and tries every entry once, in order.
    ///
    /// If the spool cannot be drained nothing is redelivered and the entries stay where they are.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SpoolError> {
        let entries = self.spool.drain_all().await?;
        let mut report = CycleReport {
            drained: entries.len(),
            ..CycleReport::default()
        };

        for entry in entries {
            match self.client.deliver(&entry).await {
                DeliveryOutcome::Delivered => {
                    report.delivered += 1;
                    self.attempts.remove(&entry);
                }
                failure => {
                    if self.record_failed_attempt(&entry) {
                        error!(
                            "Error re-forwarding record ({}), giving up after {} attempts. Record dropped",
                            failure,
                            self.policy.max_attempts.unwrap_or_default()
                        );
                        report.dropped += 1;
                        continue;
                    }
                    debug!("Error re-forwarding record ({}), saving it for retry", failure);
                    match self.spool.append(&entry).await {
                        Ok(()) => report.respooled += 1,
                        Err(e) => {
                            error!("{}. Record dropped", e);
                            self.attempts.remove(&entry);
                            report.dropped += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }

    /// Counts a failed redelivery. Returns true when the entry has no attempts left.
    fn record_failed_attempt(&mut self, entry: &[u8]) -> bool {
        let Some(max_attempts) = self.policy.max_attempts else {
            return false;
        };
        let attempts = self.attempts.entry(entry.to_vec()).or_insert(0);
        *attempts += 1;
        if *attempts >= max_attempts {
            self.attempts.remove(entry);
            return true;
        }
        false
    }
}
