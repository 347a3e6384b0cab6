// src/core/scheduler/mod.rs

//! The scheduler: a timer ticking on every instance, draining due events
//! from the buckets this instance owns and executing their policies.

mod cron;

pub use cron::next_cron_occurrence;

use crate::core::controller::Controller;
use crate::core::coordination::{Partitioner, PartitionerState};
use crate::core::errors::OtterError;
use crate::core::model::{GroupKey, ScheduledEvent};
use crate::core::store::{ClaimLock, ScalingStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Service to trigger scheduled events.
pub struct SchedulerService {
    store: Arc<dyn ScalingStore>,
    controller: Arc<Controller>,
    partitioner: Arc<Partitioner>,
    interval: Duration,
    batch_size: usize,
    /// An owned bucket whose oldest event is older than this is unhealthy.
    health_threshold: Duration,
}

impl SchedulerService {
    pub fn new(
        store: Arc<dyn ScalingStore>,
        controller: Arc<Controller>,
        partitioner: Arc<Partitioner>,
        interval: Duration,
        batch_size: usize,
        health_threshold: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            controller,
            partitioner,
            interval,
            batch_size,
            health_threshold,
        })
    }

    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Scheduler task started.");
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.check_events(Utc::now()).await {
                        error!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Scheduler task shutting down.");
                    return;
                }
            }
        }
    }

    /// One tick: advance the partitioner and drain every owned bucket.
    pub async fn check_events(&self, now: DateTime<Utc>) -> Result<(), OtterError> {
        self.partitioner.tick().await?;
        if self.partitioner.state() != PartitionerState::Acquired {
            debug!("scheduler tick skipped: partition not acquired");
            return Ok(());
        }
        for bucket in self.partitioner.current_buckets() {
            if let Err(e) = self.check_events_in_bucket(bucket, now).await {
                error!(bucket, error = %e, "failed to process bucket");
            }
        }
        Ok(())
    }

    /// Drains a bucket: fetch-and-delete due events under the bucket's claim
    /// lock, execute them, and loop immediately while full batches return.
    pub async fn check_events_in_bucket(
        &self,
        bucket: u32,
        now: DateTime<Utc>,
    ) -> Result<(), OtterError> {
        loop {
            let lock = ClaimLock::new(self.store.clone(), format!("scheduler-bucket-{bucket}"));
            let fetched = lock
                .with_lock(self.store.fetch_and_delete_events(bucket, now, self.batch_size))
                .await;
            let events = match fetched {
                Ok(events) => events,
                Err(OtterError::BusyLock(id)) => {
                    // Another instance is draining this bucket; next tick.
                    debug!(bucket, lock = %id, "bucket busy, skipping");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            if events.is_empty() {
                return Ok(());
            }
            let fetched_count = events.len();
            info!(bucket, events = fetched_count, "processing scheduled events");
            self.process_events(events, now).await?;
            if fetched_count < self.batch_size {
                return Ok(());
            }
        }
    }

    /// Executes a batch and re-adds the next occurrence of each surviving
    /// cron event.
    async fn process_events(
        &self,
        events: Vec<ScheduledEvent>,
        now: DateTime<Utc>,
    ) -> Result<(), OtterError> {
        let results = join_all(events.iter().map(|event| self.execute_event(event))).await;

        let mut deleted_policy_ids: HashSet<String> = HashSet::new();
        for (event, result) in events.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(
                    OtterError::NoSuchScalingGroup(_)
                    | OtterError::NoSuchPolicy(_)
                    | OtterError::StalePolicy(_),
                ) => {
                    // The policy or its group is gone (or was rewritten);
                    // drop the event and do not re-add its recurrence.
                    deleted_policy_ids.insert(event.policy_id.clone());
                }
                Err(OtterError::CannotExecutePolicy { reason, audit_id }) => {
                    info!(
                        policy_id = %event.policy_id,
                        reason = %reason,
                        audit_id = %audit_id,
                        "scheduled policy not executed"
                    );
                }
                Err(e) => {
                    warn!(policy_id = %event.policy_id, error = %e, "scheduled policy execution failed");
                }
            }
        }

        self.add_cron_events(&events, &deleted_policy_ids, now).await
    }

    async fn execute_event(&self, event: &ScheduledEvent) -> Result<(), OtterError> {
        let key = GroupKey::new(&event.tenant_id, &event.group_id);
        debug!(
            tenant_id = %event.tenant_id,
            scaling_group_id = %event.group_id,
            policy_id = %event.policy_id,
            scheduled_time = %event.trigger,
            "executing scheduled policy"
        );
        self.controller
            .execute_policy(&key, &event.policy_id, Some(&event.version))
            .await?;
        Ok(())
    }

    async fn add_cron_events(
        &self,
        events: &[ScheduledEvent],
        deleted_policy_ids: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OtterError> {
        let mut successors = Vec::new();
        for event in events {
            if deleted_policy_ids.contains(&event.policy_id) {
                continue;
            }
            if let Some(expression) = &event.cron {
                let next = next_cron_occurrence(expression, now)?;
                if let Some(successor) = event.successor(next) {
                    successors.push(successor);
                }
            }
        }
        if !successors.is_empty() {
            info!(new_cron_events = successors.len(), "re-adding cron events");
            self.store.add_events(successors).await?;
        }
        Ok(())
    }

    /// Health probe: healthy while no owned bucket has an event older than
    /// the threshold.
    pub async fn health(&self, now: DateTime<Utc>) -> (bool, serde_json::Value) {
        if self.partitioner.state() != PartitionerState::Acquired {
            return (false, json!({ "reason": "partitioner not acquired" }));
        }
        let mut old_events = Vec::new();
        for bucket in self.partitioner.current_buckets() {
            match self.store.oldest_event(bucket).await {
                Ok(Some(event)) => {
                    let age = (now - event.trigger).num_seconds();
                    if age > self.health_threshold.as_secs() as i64 {
                        old_events.push(json!({
                            "bucket": bucket,
                            "policy_id": event.policy_id,
                            "trigger": event.trigger.to_rfc3339(),
                            "age_seconds": age,
                        }));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(bucket, error = %e, "failed to read oldest event");
                }
            }
        }
        (old_events.is_empty(), json!({ "old_events": old_events }))
    }
}
