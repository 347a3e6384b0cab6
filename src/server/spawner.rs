// src/server/spawner.rs

//! Spawns all of the controller's long-running background tasks.

use super::context::ServerContext;
use super::health_server;
use anyhow::Result;
use tracing::info;

/// Spawns all critical background tasks into the provided JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let state = &ctx.state;
    let shutdown_tx = &ctx.shutdown_tx;
    let background_tasks = &mut ctx.background_tasks;

    // --- Scheduler ---
    let scheduler = state.scheduler.clone();
    let shutdown_rx_scheduler = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        scheduler.run(shutdown_rx_scheduler).await;
        Ok(())
    });

    // --- Self-heal ---
    let selfheal = state.selfheal.clone();
    let shutdown_rx_selfheal = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        selfheal.run(shutdown_rx_selfheal).await;
        Ok(())
    });

    // --- Health probe ---
    if state.config.health.enabled {
        let health_state = state.clone();
        let shutdown_rx_health = shutdown_tx.subscribe();
        background_tasks.spawn(async move {
            health_server::run_health_server(health_state, shutdown_rx_health).await;
            Ok(())
        });
    } else {
        info!("Health probe endpoint is disabled in the configuration.");
    }

    Ok(())
}
