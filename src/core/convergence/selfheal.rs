// src/core/convergence/selfheal.rs

//! The self-heal driver: on one node at a time, periodically walk every
//! eligible group and trigger convergence, spread across the interval so
//! the cloud never sees a thundering herd.

use crate::core::controller::Controller;
use crate::core::coordination::{CoordinationClient, DistributedLock, SessionState};
use crate::core::errors::OtterError;
use crate::core::model::{GroupKey, GroupStatus};
use crate::core::store::ScalingStore;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Margin kept free at the end of each wave so the last triggers land
/// before the next tick.
const WAVE_MARGIN: Duration = Duration::from_secs(5);
/// How long a non-holder waits for the lock before yielding to this tick.
const LOCK_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(100);

/// A task that triggers convergence on all groups on an interval basis.
/// Only the node holding the self-heal lock runs waves.
pub struct SelfHeal {
    controller: Arc<Controller>,
    store: Arc<dyn ScalingStore>,
    coordination: Arc<dyn CoordinationClient>,
    lock: DistributedLock,
    interval: Duration,
    /// Tenants enabled for convergence; empty means all tenants.
    enabled_tenants: Vec<String>,
    calls: Mutex<Vec<JoinHandle<()>>>,
}

impl SelfHeal {
    pub fn new(
        controller: Arc<Controller>,
        store: Arc<dyn ScalingStore>,
        coordination: Arc<dyn CoordinationClient>,
        lock_path: &str,
        interval: Duration,
        enabled_tenants: Vec<String>,
    ) -> Arc<Self> {
        let lock = DistributedLock::new(coordination.clone(), lock_path);
        Arc::new(Self {
            controller,
            store,
            coordination,
            lock,
            interval,
            enabled_tenants,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Runs the main loop until shutdown, then cancels any remaining
    /// scheduled calls and releases the lock.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Self-heal task started.");
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.converge_all().await {
                        error!(error = %e, "self-heal cycle failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Self-heal task shutting down.");
                    self.cancel_scheduled_calls();
                    if let Err(e) = self.lock.release().await {
                        warn!(error = %e, "failed to release self-heal lock on shutdown");
                    }
                    return;
                }
            }
        }
    }

    /// One tick: verify the session, confirm (or try to take) the lock, and
    /// schedule a wave. Lock state is re-checked against the coordination
    /// service every time, because the session may have bounced between
    /// intervals and silently dropped our claim.
    pub async fn converge_all(&self) -> Result<(), OtterError> {
        if self.coordination.session_state() != SessionState::Connected {
            error!("self-heal skipped: coordination session not connected");
            return Ok(());
        }

        if self.lock.is_held().await? {
            return self.perform().await;
        }
        match self.lock.acquire(LOCK_ATTEMPT_TIMEOUT).await {
            Ok(()) => {
                info!("self-heal lock acquired");
                self.perform().await
            }
            // Another node has it; try again next interval.
            Err(OtterError::LockTimeout(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn perform(&self) -> Result<(), OtterError> {
        let groups = self.groups_to_converge().await?;

        let leftover = self.cancel_scheduled_calls();
        if leftover > 0 {
            // A previous wave must have fully drained or been cancelled by
            // now; anything else is an invariant violation, reset by force.
            error!(
                active = leftover,
                "scheduled calls survived the previous self-heal wave; forcibly reset"
            );
        }
        if groups.is_empty() {
            debug!("self-heal wave: no eligible groups");
            return Ok(());
        }

        let window = self.interval.saturating_sub(WAVE_MARGIN);
        let spacing = window.div_f64(groups.len() as f64);
        debug!(
            groups = groups.len(),
            spacing_ms = spacing.as_millis() as u64,
            "scheduling self-heal wave"
        );

        let mut calls = self.calls.lock();
        for (i, key) in groups.into_iter().enumerate() {
            let controller = self.controller.clone();
            let store = self.store.clone();
            let delay = spacing.mul_f64(i as f64);
            calls.push(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = check_and_trigger(&controller, &store, &key).await {
                    warn!(group = %key, error = %e, "self-heal trigger failed");
                }
            }));
        }
        Ok(())
    }

    /// Aborts outstanding scheduled triggers, returning how many were still
    /// pending.
    pub fn cancel_scheduled_calls(&self) -> usize {
        let mut calls = self.calls.lock();
        let active = calls.iter().filter(|h| !h.is_finished()).count();
        for handle in calls.drain(..) {
            handle.abort();
        }
        active
    }

    async fn groups_to_converge(&self) -> Result<Vec<GroupKey>, OtterError> {
        let groups = self.store.list_groups().await?;
        Ok(groups
            .into_iter()
            .filter(|g| self.tenant_is_enabled(&g.tenant_id))
            .collect())
    }

    pub fn tenant_is_enabled(&self, tenant_id: &str) -> bool {
        self.enabled_tenants.is_empty() || self.enabled_tenants.iter().any(|t| t == tenant_id)
    }

    /// Health probe: `(healthy, detail)` with lock ownership and the number
    /// of triggers still scheduled.
    pub async fn health(&self) -> (bool, serde_json::Value) {
        let connected = self.coordination.session_state() == SessionState::Connected;
        let has_lock = self.lock.is_held().await.unwrap_or(false);
        let scheduled = self.calls.lock().iter().filter(|h| !h.is_finished()).count();
        (
            connected,
            json!({ "has_lock": has_lock, "scheduled_calls": scheduled }),
        )
    }
}

/// Triggers convergence on a group if it is ACTIVE and not paused.
pub async fn check_and_trigger(
    controller: &Arc<Controller>,
    store: &Arc<dyn ScalingStore>,
    key: &GroupKey,
) -> Result<(), OtterError> {
    let group = store.get_group(key).await?;
    let state = store.view_state(key).await?;
    if group.status == GroupStatus::Active && !state.paused {
        controller.trigger_convergence(key, true);
    }
    Ok(())
}
