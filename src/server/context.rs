// src/server/context.rs

use crate::core::state::ControllerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the controller's tasks.
pub struct ServerContext {
    pub state: Arc<ControllerState>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
}
