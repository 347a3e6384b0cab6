// src/server/health_server.rs

use crate::core::state::ControllerState;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /health endpoint, aggregating the scheduler
/// and self-heal probes into `(healthy, detail)`.
async fn health_handler(state: Arc<ControllerState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let (scheduler_healthy, scheduler_detail) = state.scheduler.health(now).await;
    let (selfheal_healthy, selfheal_detail) = state.selfheal.health().await;

    let healthy = scheduler_healthy && selfheal_healthy;
    let body = json!({
        "healthy": healthy,
        "detail": {
            "scheduler": { "healthy": scheduler_healthy, "detail": scheduler_detail },
            "self_heal": { "healthy": selfheal_healthy, "detail": selfheal_detail },
        }
    });
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Runs a simple HTTP server exposing the health probe on /health.
pub async fn run_health_server(
    state: Arc<ControllerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let port = state.config.health.port;
    let app = Router::new().route("/health", get(move || health_handler(state.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Health probe listening on http://{}/health", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind health server on port {}: {}", port, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Health server shutting down.");
        })
        .await
    {
        error!("Health server error: {}", e);
    }
}
