// src/core/controller/mod.rs

//! The controller: cooldown checks, desired-capacity arithmetic, and the
//! per-group serialization that every state mutation funnels through.

mod trigger;

use crate::core::convergence::{ConvergenceOutcome, GroupConverger};
use crate::core::errors::OtterError;
use crate::core::model::{
    Adjustment, GroupConfig, GroupKey, GroupState, Policy, ScalingGroup, timestamp,
};
use crate::core::store::ScalingStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Checks the group-wide cooldown (last time any policy ran) and the
/// policy-specific cooldown. Returns `false` while either is still hot.
pub fn check_cooldowns(
    state: &GroupState,
    config: &GroupConfig,
    policy: &Policy,
    policy_id: &str,
    now: DateTime<Utc>,
) -> bool {
    let timestamps_and_cooldowns = [
        (state.policy_touched.get(policy_id), policy.cooldown, "policy"),
        (state.group_touched.as_ref(), config.cooldown, "group"),
    ];

    for (last_time, cooldown, cooldown_type) in timestamps_and_cooldowns {
        if let Some(last) = last_time {
            let elapsed = timestamp::seconds_since(last, now).unwrap_or(f64::MAX);
            if elapsed < cooldown as f64 {
                debug!(
                    cooldown_type,
                    cooldown_seconds = cooldown,
                    time_since_last_touched = elapsed,
                    "cooldown not reached"
                );
                return false;
            }
        }
    }
    true
}

/// The unconstrained new desired capacity. `changePercent` rounds away from
/// zero: up for positive deltas, down for negative ones.
pub fn calculate_desired(current: u32, adjustment: &Adjustment) -> i64 {
    match adjustment {
        Adjustment::Change(change) => current as i64 + change,
        Adjustment::ChangePercent(percent) => {
            let raw = current as f64 * percent / 100.0;
            let delta = if raw > 0.0 { raw.ceil() } else { raw.floor() };
            current as i64 + delta as i64
        }
        Adjustment::DesiredCapacity(capacity) => *capacity as i64,
    }
}

/// Clamps a desired capacity to `[min_entities, effective_max]`, where the
/// effective maximum is the configured maximum bounded by the hard cap.
pub fn constrain_desired(desired: i64, config: &GroupConfig) -> u32 {
    let max = config.effective_max() as i64;
    let min = config.min_entities as i64;
    desired.clamp(min, max).max(0) as u32
}

/// A state mutation applied under the group lock: sees the loaded group and
/// the current state, returns the state to persist.
pub type StateFn = Box<
    dyn FnOnce(ScalingGroup, GroupState) -> BoxFuture<'static, Result<GroupState, OtterError>>
        + Send,
>;

/// Serializes all state mutation per group and kicks convergence afterwards.
/// One instance per process; group locks are process-local because each
/// group's mutations are already pinned to one node by the schedulers, and
/// the store write is the cross-process backstop.
pub struct Controller {
    store: Arc<dyn ScalingStore>,
    converger: Arc<dyn GroupConverger>,
    group_locks: DashMap<GroupKey, Arc<tokio::sync::Mutex<()>>>,
    gates: DashMap<GroupKey, Arc<trigger::ConvergenceGate>>,
    update_backoff: Duration,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ScalingStore>,
        converger: Arc<dyn GroupConverger>,
        update_backoff: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            converger,
            group_locks: DashMap::new(),
            gates: DashMap::new(),
            update_backoff,
        })
    }

    pub fn store(&self) -> &Arc<dyn ScalingStore> {
        &self.store
    }

    fn group_lock(&self, key: &GroupKey) -> Arc<tokio::sync::Mutex<()>> {
        self.group_locks.entry(key.clone()).or_default().clone()
    }

    fn gate(&self, key: &GroupKey) -> Arc<trigger::ConvergenceGate> {
        self.gates.entry(key.clone()).or_default().clone()
    }

    /// Loads the group and its state under the group lock, applies `mutate`,
    /// and persists the result. No convergence is fired.
    async fn modify(&self, key: &GroupKey, mutate: StateFn) -> Result<GroupState, OtterError> {
        let lock = self.group_lock(key);
        let _guard = lock.lock().await;
        let group = self.store.get_group(key).await?;
        let state = self.store.view_state(key).await?;
        let new_state = mutate(group, state).await?;
        self.store.update_state(key, new_state.clone()).await?;
        Ok(new_state)
    }

    /// `modify` followed by a convergence kickoff. Convergence errors are
    /// logged by the gate and never undo the state change; desired is the
    /// source of truth and the next self-heal pass re-converges.
    pub async fn modify_and_trigger(
        self: &Arc<Self>,
        key: &GroupKey,
        mutate: StateFn,
    ) -> Result<GroupState, OtterError> {
        let new_state = self.modify(key, mutate).await?;
        self.trigger_convergence(key, false);
        Ok(new_state)
    }

    /// Checks whether and how much a scaling policy can execute, then
    /// executes it: version check, cooldowns, desired calculation, clamp,
    /// touch-timestamp recording, persist, converge.
    pub async fn execute_policy(
        self: &Arc<Self>,
        key: &GroupKey,
        policy_id: &str,
        version: Option<&str>,
    ) -> Result<GroupState, OtterError> {
        let store = self.store.clone();
        let policy_id = policy_id.to_string();
        let version = version.map(str::to_string);

        self.modify_and_trigger(
            key,
            Box::new(move |group, mut state| {
                async move {
                    let policy = store
                        .get_policy(&group.key, &policy_id, version.as_deref())
                        .await?;
                    let now = Utc::now();

                    if state.paused {
                        return Err(cannot_execute("group is paused"));
                    }
                    if !check_cooldowns(&state, &group.config, &policy, &policy_id, now) {
                        return Err(cannot_execute("Cooldowns not met."));
                    }

                    let current = state.desired;
                    let desired = calculate_desired(current, &policy.adjustment);
                    state.desired = constrain_desired(desired, &group.config);
                    debug!(
                        scaling_group_id = %group.key.group_id,
                        policy_id = %policy_id,
                        prev_desired = current,
                        curr_desired = state.desired,
                        "executing scaling policy"
                    );
                    state.mark_executed(&policy_id, timestamp::to_zulu(now));
                    Ok(state)
                }
                .boxed()
            }),
        )
        .await
    }

    /// Applies a config change: no cooldowns, no policy arithmetic, just a
    /// re-clamp of the current desired against the new bounds, then converge.
    pub async fn obey_config_change(self: &Arc<Self>, key: &GroupKey) -> Result<GroupState, OtterError> {
        self.modify_and_trigger(
            key,
            Box::new(|group, mut state| {
                async move {
                    state.desired = constrain_desired(state.desired as i64, &group.config);
                    Ok(state)
                }
                .boxed()
            }),
        )
        .await
    }

    /// Pauses the group: policy executions are rejected until resumed.
    /// Idempotent, and never fires convergence.
    pub async fn pause(&self, key: &GroupKey) -> Result<GroupState, OtterError> {
        self.modify(
            key,
            Box::new(|_, mut state| {
                async move {
                    state.paused = true;
                    Ok(state)
                }
                .boxed()
            }),
        )
        .await
    }

    /// Resumes the group. Idempotent, and never fires convergence.
    pub async fn resume(&self, key: &GroupKey) -> Result<GroupState, OtterError> {
        self.modify(
            key,
            Box::new(|_, mut state| {
                async move {
                    state.paused = false;
                    Ok(state)
                }
                .boxed()
            }),
        )
        .await
    }

    /// Kicks off a convergence pass for the group in the background. Passes
    /// for one group never overlap; while one runs, further triggers
    /// collapse into at most one queued follow-up.
    pub fn trigger_convergence(self: &Arc<Self>, key: &GroupKey, on_error: bool) {
        let controller = self.clone();
        let key = key.clone();
        tokio::spawn(async move {
            trigger::drive(controller, key, on_error).await;
        });
    }

    /// One convergence pass, skipping paused groups and groups whose status
    /// excludes convergence.
    pub(crate) async fn converge_once(
        &self,
        key: &GroupKey,
        on_error: bool,
    ) -> Result<ConvergenceOutcome, OtterError> {
        let group = self.store.get_group(key).await?;
        let state = self.store.view_state(key).await?;

        if state.paused {
            debug!(group = %key, "skipping convergence: group is paused");
            return Ok(ConvergenceOutcome::noop());
        }
        let eligible = match group.status {
            crate::core::model::GroupStatus::Active => true,
            crate::core::model::GroupStatus::Error => on_error,
            _ => false,
        };
        if !eligible {
            debug!(group = %key, status = ?group.status, "skipping convergence: status not eligible");
            return Ok(ConvergenceOutcome::noop());
        }

        let outcome = self.converger.converge(&group, &state).await?;

        // Write back what the pass learned: a freshly created stack link,
        // and the observed active/pending picture the capacity snapshot
        // reflects.
        if outcome.new_heat_stack.is_some() || outcome.observed.is_some() {
            let link = outcome.new_heat_stack.clone();
            let observed = outcome.observed.clone();
            self.modify(
                key,
                Box::new(move |_, mut state| {
                    async move {
                        if let Some(link) = link {
                            state.heat_stack = Some(link);
                        }
                        if let Some(observed) = observed {
                            state.active = observed.active;
                            state.pending = observed.pending;
                        }
                        Ok(state)
                    }
                    .boxed()
                }),
            )
            .await?;
        }
        Ok(outcome)
    }

    pub(crate) fn update_backoff(&self) -> Duration {
        self.update_backoff
    }
}

fn cannot_execute(reason: &str) -> OtterError {
    OtterError::CannotExecutePolicy {
        reason: reason.to_string(),
        audit_id: uuid::Uuid::new_v4().to_string(),
    }
}
