// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use tracing::{info, warn};

mod context;
mod health_server;
mod initialization;
mod spawner;

pub use context::ServerContext;

/// The main controller startup function, orchestrating all setup phases.
pub async fn run(config: Config) -> Result<()> {
    // 1. Initialize shared state, clients, and control loops.
    let mut server_context = initialization::setup(config).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context)?;

    // 3. Wait for a shutdown signal, then stop every task.
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping background tasks.");
    let _ = server_context.shutdown_tx.send(());

    while let Some(result) = server_context.background_tasks.join_next().await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Background task exited with error: {e}"),
            Err(e) => warn!("Background task panicked: {e}"),
        }
    }
    info!("All background tasks stopped.");
    Ok(())
}
