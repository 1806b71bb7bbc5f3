// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Titorelli Fleet - Bot Fleet Reconciliation Daemon
//!
//! Keeps the bot store and the container platform in agreement:
//! - Reconciliation loop (poll, diff, correct)
//! - Per-bot lifecycle controllers created on demand
//! - Dockhost CLI as the container platform

use std::sync::Arc;
use tracing::{info, warn};

use titorelli_fleet::config::Config;
use titorelli_fleet::platform::{ContainerPlatform, DockhostCli};
use titorelli_fleet::runtime::FleetRuntime;
use titorelli_fleet::store::SqliteBotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "titorelli_fleet=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        project = %config.project,
        prefix = %config.container_prefix,
        image = %config.image,
        "Starting Titorelli Fleet"
    );

    let store = Arc::new(SqliteBotStore::connect(&config.database_url).await?);
    info!("Bot store ready");

    let platform = Arc::new(DockhostCli::new(config.dockhost.clone()));
    info!(platform = platform.platform_type(), "Platform initialized");

    let runtime = FleetRuntime::builder()
        .config(&config)
        .store(store)
        .platform(platform)
        .build()?
        .start()
        .await?;

    info!("Fleet reconciler running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Titorelli Fleet shut down");

    Ok(())
}
