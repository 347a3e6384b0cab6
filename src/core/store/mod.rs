// src/core/store/mod.rs

//! The persistence seam. The wide-column store itself is an external
//! collaborator; this module defines the contract the control loops need,
//! plus the claim-row lock recipe built on it.

mod lock;
mod memory;

pub use lock::ClaimLock;
pub use memory::InMemoryStore;

use crate::core::errors::OtterError;
use crate::core::model::{GroupKey, GroupState, Policy, ScalingGroup, ScheduledEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Storage contract for groups, policies, scheduled events, and lock claims.
#[async_trait]
pub trait ScalingStore: Send + Sync {
    /// Loads a group's identity, configs, and status.
    /// Fails with `NoSuchScalingGroup` when absent.
    async fn get_group(&self, key: &GroupKey) -> Result<ScalingGroup, OtterError>;

    /// Every group key in the store, for the self-heal sweep.
    async fn list_groups(&self) -> Result<Vec<GroupKey>, OtterError>;

    async fn view_state(&self, key: &GroupKey) -> Result<GroupState, OtterError>;

    async fn update_state(&self, key: &GroupKey, state: GroupState) -> Result<(), OtterError>;

    /// Loads a policy; with `version` supplied, a mismatch fails with
    /// `StalePolicy`. Absent policies fail with `NoSuchPolicy`.
    async fn get_policy(
        &self,
        key: &GroupKey,
        policy_id: &str,
        version: Option<&str>,
    ) -> Result<Policy, OtterError>;

    /// Atomically fetches and deletes up to `batch_size` events in `bucket`
    /// whose trigger is at or before `now`, ordered by trigger then policy
    /// id. The caller holds the bucket's claim lock, so no two instances
    /// observe the same event.
    async fn fetch_and_delete_events(
        &self,
        bucket: u32,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<ScheduledEvent>, OtterError>;

    async fn add_events(&self, events: Vec<ScheduledEvent>) -> Result<(), OtterError>;

    /// The event with the earliest trigger in `bucket`, for health checks.
    async fn oldest_event(&self, bucket: u32) -> Result<Option<ScheduledEvent>, OtterError>;

    // --- Claim rows backing `ClaimLock` ---

    /// Inserts (or refreshes) a claim row with the given TTL.
    async fn insert_claim(
        &self,
        lock_id: &str,
        claim_id: Uuid,
        ttl: Duration,
    ) -> Result<(), OtterError>;

    /// Live (unexpired) claims for a lock, oldest first.
    async fn read_claims(&self, lock_id: &str) -> Result<Vec<Uuid>, OtterError>;

    async fn delete_claim(&self, lock_id: &str, claim_id: Uuid) -> Result<(), OtterError>;
}
