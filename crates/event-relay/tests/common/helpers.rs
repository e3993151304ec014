// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the relay integration tests

use event_relay::config::RelayConfig;
use event_relay::retry::RetryPolicy;
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, Instant};

/// Config listening on a random local port, retrying every `retry_interval`
pub fn relay_config(sink_url: String, spool_dir: &Path, retry_interval: Duration) -> RelayConfig {
    RelayConfig {
        listen_host: "127.0.0.1".to_string(),
        listen_port: 0,
        endpoint_url: sink_url,
        retry_file: spool_dir.join("retry.log"),
        delivery_timeout: Duration::from_secs(5),
        retry_policy: RetryPolicy {
            interval: retry_interval,
            ..RetryPolicy::default()
        },
        ..RelayConfig::default()
    }
}

/// Sends `payload` on a fresh connection and closes the write side
pub async fn send_records(addr: SocketAddr, payload: &[u8]) {
    let mut stream = TcpStream::connect(addr)
        .await
        .expect("Failed to connect to relay");
    stream
        .write_all(payload)
        .await
        .expect("Failed to write records");
    stream.shutdown().await.expect("Failed to close connection");
}

/// Polls `condition` every 20ms until it holds or `timeout` elapses
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    condition().await
}

/// Reads the spool file directly and parses each line
pub fn spool_records(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("spool line is not valid JSON"))
        .collect()
}
