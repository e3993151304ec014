// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of the relay: builds every component from a [`RelayConfig`] and runs the listener
//! and the retry loop as background tasks.

use crate::config::RelayConfig;
use crate::delivery::DeliveryClient;
use crate::errors::RelayError;
use crate::ingest::IngestHandler;
use crate::retry::RetryLoop;
use crate::server::{RelayServer, RelayServerConfig};
use crate::spool::Spool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct Relay;

impl Relay {
    /// Validates `config`, binds the listener and spawns the listener and retry tasks.
    ///
    /// Only configuration and bind problems are reported here; everything after startup is
    /// handled and logged inside the tasks.
    pub async fn start(config: RelayConfig) -> Result<RelayHandle, RelayError> {
        config.validate()?;

        let client = DeliveryClient::new(
            config.endpoint_url.clone(),
            config.https_proxy.as_deref(),
            config.delivery_timeout,
        )?;
        let spool = Arc::new(Spool::new(config.retry_file.clone()));
        let handler = Arc::new(IngestHandler::new(
            client.clone(),
            Arc::clone(&spool),
            config.max_payload_bytes,
            config.read_timeout,
        ));
        let cancel_token = CancellationToken::new();

        let server = RelayServer::new(
            &RelayServerConfig {
                listen_addr: config.listen_addr(),
                max_connections: config.max_connections,
            },
            handler,
            cancel_token.clone(),
        )
        .await?;
        let local_addr = server
            .local_addr()
            .map_err(|source| RelayError::Bind {
                addr: config.listen_addr(),
                source,
            })?;

        info!("Server is listening on TCP {}", local_addr);
        info!("Forwarding data to {}", client.endpoint());

        let retry_loop = RetryLoop::new(
            Arc::clone(&spool),
            client,
            config.retry_policy.clone(),
            cancel_token.clone(),
        );
        let retry_handle = tokio::spawn(retry_loop.spin());
        let server_handle = tokio::spawn(server.spin());

        Ok(RelayHandle {
            local_addr,
            spool,
            cancel_token,
            server_handle,
            retry_handle,
        })
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    local_addr: SocketAddr,
    spool: Arc<Spool>,
    cancel_token: CancellationToken,
    server_handle: JoinHandle<()>,
    retry_handle: JoinHandle<()>,
}

impl RelayHandle {
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn spool(&self) -> &Arc<Spool> {
        &self.spool
    }

    /// Stops accepting connections and waits for in-flight connections and the current retry
    /// cycle to finish.
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.server_handle.await {
            error!("Listener task failed: {:?}", e);
        }
        if let Err(e) = self.retry_handle.await {
            error!("Retry task failed: {:?}", e);
        }
        info!("Relay stopped");
    }
}
