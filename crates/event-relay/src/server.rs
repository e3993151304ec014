// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! TCP listener feeding accepted connections to the [`IngestHandler`].
//!
//! Every connection gets its own task and carries one ingest episode: read to end of stream,
//! process, close. A semaphore bounds how many connections are processed at once; when it is
//! exhausted the listener stops accepting until a connection finishes.

use crate::errors::RelayError;
use crate::ingest::IngestHandler;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

pub struct RelayServerConfig {
    /// `host:port` to bind, e.g. "0.0.0.0:7000"
    pub listen_addr: String,
    /// Connections processed at the same time
    pub max_connections: usize,
}

pub struct RelayServer {
    listener: TcpListener,
    handler: Arc<IngestHandler>,
    permits: Arc<Semaphore>,
    cancel_token: CancellationToken,
}

impl RelayServer {
    /// Binds the listener. Failing to bind is fatal for the relay.
    pub async fn new(
        config: &RelayServerConfig,
        handler: Arc<IngestHandler>,
        cancel_token: CancellationToken,
    ) -> Result<RelayServer, RelayError> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;

        Ok(RelayServer {
            listener,
            handler,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            cancel_token,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the cancel token fires, then waits for the connections
    /// already accepted to finish.
    pub async fn spin(self) {
        let mut joinset = JoinSet::new();

        loop {
            let permit = tokio::select! {
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = self.cancel_token.cancelled() => break,
            };

            let (stream, peer) = tokio::select! {
                con_res = self.listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                    Ok(conn) => conn,
                },
                Some(finished) = joinset.join_next(), if !joinset.is_empty() => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            // Don't kill the listener on panic - log and continue
                            error!("Connection handler panicked: {:?}", e);
                        }
                    }
                    continue;
                },
                _ = self.cancel_token.cancelled() => break,
            };

            debug!("Accepted connection from {}", peer);
            let handler = Arc::clone(&self.handler);
            joinset.spawn(async move {
                let _permit = permit;
                handler.handle(stream, &peer.to_string()).await;
            });
        }

        debug!(
            "Listener stopped, waiting for {} connections",
            joinset.len()
        );
        while let Some(finished) = joinset.join_next().await {
            if let Err(e) = finished {
                if e.is_panic() {
                    error!("Connection handler panicked: {:?}", e);
                }
            }
        }
    }
}
