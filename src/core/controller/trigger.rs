// src/core/controller/trigger.rs

//! The per-group convergence gate: one pass at a time, at most one queued
//! follow-up, and `UpdateInProgress` back-off.

use super::Controller;
use crate::core::errors::OtterError;
use crate::core::model::GroupKey;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

#[derive(Default)]
pub(crate) struct ConvergenceGate {
    running: tokio::sync::Mutex<()>,
    queued: AtomicBool,
}

/// Drives convergence for one group. If a pass is already running, leaves a
/// single queued marker (repeat triggers collapse into it) and returns; the
/// running driver services the marker before it exits.
pub(crate) async fn drive(controller: Arc<Controller>, key: GroupKey, on_error: bool) {
    let gate = controller.gate(&key);
    let mut follow_up_used = false;

    loop {
        let Ok(guard) = gate.running.try_lock() else {
            gate.queued.store(true, Ordering::SeqCst);
            return;
        };
        gate.queued.store(false, Ordering::SeqCst);

        match controller.converge_once(&key, on_error).await {
            Ok(_) => {}
            Err(OtterError::UpdateInProgress(what)) if !follow_up_used => {
                follow_up_used = true;
                info!(group = %key, what = %what, "update in progress; queueing one follow-up pass");
                drop(guard);
                tokio::time::sleep(controller.update_backoff()).await;
                continue;
            }
            Err(OtterError::UpdateInProgress(what)) => {
                warn!(
                    group = %key,
                    what = %what,
                    "update still in progress after follow-up; leaving it to the next sweep"
                );
            }
            // State is already persisted; a failed pass is logged, never
            // rolled back. The next self-heal sweep re-converges.
            Err(e) => error!(group = %key, error = %e, "convergence pass failed"),
        }

        drop(guard);
        if !gate.queued.load(Ordering::SeqCst) {
            return;
        }
    }
}
