// SPDX-License-Identifier: GPL-3.0-only

//! nas-storaged: storage backend daemon
//!
//! Loads the configuration, scans devices, mounts startup volumes, then keeps
//! the heartbeat and periodic rescans running until SIGINT.

use anyhow::{Context, Result};
use clap::Parser;
use nas_contracts::OperationContext;
use nas_service::{Cli, ServiceConfig, StorageBackend, logging};
use nix::unistd::Uid;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::from_cli(&cli).context("loading configuration")?;
    let _log_guard = logging::init(&config)?;

    tracing::info!("Starting nas-storaged v{}", env!("CARGO_PKG_VERSION"));

    if !Uid::effective().is_root() {
        tracing::error!("nas-storaged must run as root");
        anyhow::bail!("Service must run with root privileges");
    }

    let backend = StorageBackend::system(config);
    let shutdown = CancellationToken::new();

    backend
        .start(&OperationContext::with_cancel(shutdown.child_token()))
        .await
        .context("starting storage backend")?;
    let tasks = backend.spawn_background(&shutdown);

    tracing::info!("Service ready, waiting for requests...");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    shutdown.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "background task ended abnormally");
        }
    }

    tracing::info!("nas-storaged shutting down");
    Ok(())
}
