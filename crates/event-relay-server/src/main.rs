// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use event_relay::{config::RelayConfig, service::Relay};

#[tokio::main]
pub async fn main() -> ExitCode {
    // Read before the subscriber exists so LOG_LEVEL drives it; errors are logged below.
    let config = RelayConfig::from_env();
    let log_level = config
        .as_ref()
        .map_or("info", |config| config.log_level.as_str());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating config on relay startup: {e}");
            return ExitCode::FAILURE;
        }
    };

    let relay = match Relay::start(config).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("Error when starting relay: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal, running until killed: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping relay");
    relay.shutdown().await;

    ExitCode::SUCCESS
}
