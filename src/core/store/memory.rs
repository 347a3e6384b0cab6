// src/core/store/memory.rs

//! In-process implementation of `ScalingStore`. Backs the test suite and
//! single-node deployments without an external store.

use super::ScalingStore;
use crate::core::errors::OtterError;
use crate::core::model::{GroupKey, GroupState, Policy, ScalingGroup, ScheduledEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use uuid::Uuid;

struct StoredGroup {
    group: ScalingGroup,
    state: GroupState,
    policies: HashMap<String, Policy>,
}

struct Claim {
    claim_id: Uuid,
    inserted_at: Instant,
    expires_at: Instant,
}

/// Events are keyed `(bucket, trigger, policy_id)` so range scans come back
/// in trigger order with policy-id tie-breaking, matching the table layout.
type EventKey = (u32, DateTime<Utc>, String);

#[derive(Default)]
pub struct InMemoryStore {
    groups: DashMap<GroupKey, StoredGroup>,
    events: Mutex<BTreeMap<EventKey, ScheduledEvent>>,
    claims: Mutex<HashMap<String, Vec<Claim>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a group with its initial state. Replaces any existing entry.
    pub fn put_group(&self, group: ScalingGroup, state: GroupState) {
        self.groups.insert(
            group.key.clone(),
            StoredGroup {
                group,
                state,
                policies: HashMap::new(),
            },
        );
    }

    pub fn put_policy(&self, key: &GroupKey, policy: Policy) {
        if let Some(mut stored) = self.groups.get_mut(key) {
            stored.policies.insert(policy.id.clone(), policy);
        }
    }

    pub fn remove_policy(&self, key: &GroupKey, policy_id: &str) {
        if let Some(mut stored) = self.groups.get_mut(key) {
            stored.policies.remove(policy_id);
        }
    }

    pub fn remove_group(&self, key: &GroupKey) {
        self.groups.remove(key);
    }

    pub fn event_count(&self, bucket: u32) -> usize {
        self.events
            .lock()
            .keys()
            .filter(|(b, _, _)| *b == bucket)
            .count()
    }
}

#[async_trait]
impl ScalingStore for InMemoryStore {
    async fn get_group(&self, key: &GroupKey) -> Result<ScalingGroup, OtterError> {
        self.groups
            .get(key)
            .map(|stored| stored.group.clone())
            .ok_or_else(|| OtterError::NoSuchScalingGroup(key.to_string()))
    }

    async fn list_groups(&self) -> Result<Vec<GroupKey>, OtterError> {
        let mut keys: Vec<GroupKey> = self.groups.iter().map(|e| e.key().clone()).collect();
        keys.sort_by(|a, b| (&a.tenant_id, &a.group_id).cmp(&(&b.tenant_id, &b.group_id)));
        Ok(keys)
    }

    async fn view_state(&self, key: &GroupKey) -> Result<GroupState, OtterError> {
        self.groups
            .get(key)
            .map(|stored| stored.state.clone())
            .ok_or_else(|| OtterError::NoSuchScalingGroup(key.to_string()))
    }

    async fn update_state(&self, key: &GroupKey, state: GroupState) -> Result<(), OtterError> {
        let mut stored = self
            .groups
            .get_mut(key)
            .ok_or_else(|| OtterError::NoSuchScalingGroup(key.to_string()))?;
        stored.state = state;
        Ok(())
    }

    async fn get_policy(
        &self,
        key: &GroupKey,
        policy_id: &str,
        version: Option<&str>,
    ) -> Result<Policy, OtterError> {
        let stored = self
            .groups
            .get(key)
            .ok_or_else(|| OtterError::NoSuchScalingGroup(key.to_string()))?;
        let policy = stored
            .policies
            .get(policy_id)
            .cloned()
            .ok_or_else(|| OtterError::NoSuchPolicy(policy_id.to_string()))?;
        if let Some(expected) = version {
            if policy.version != expected {
                return Err(OtterError::StalePolicy(policy_id.to_string()));
            }
        }
        Ok(policy)
    }

    async fn fetch_and_delete_events(
        &self,
        bucket: u32,
        now: DateTime<Utc>,
        batch_size: usize,
    ) -> Result<Vec<ScheduledEvent>, OtterError> {
        let mut events = self.events.lock();
        let due: Vec<EventKey> = events
            .range((bucket, DateTime::<Utc>::MIN_UTC, String::new())..)
            .take_while(|((b, trigger, _), _)| *b == bucket && *trigger <= now)
            .take(batch_size)
            .map(|(key, _)| key.clone())
            .collect();
        Ok(due
            .into_iter()
            .filter_map(|key| events.remove(&key))
            .collect())
    }

    async fn add_events(&self, new_events: Vec<ScheduledEvent>) -> Result<(), OtterError> {
        let mut events = self.events.lock();
        for event in new_events {
            events.insert(
                (event.bucket, event.trigger, event.policy_id.clone()),
                event,
            );
        }
        Ok(())
    }

    async fn oldest_event(&self, bucket: u32) -> Result<Option<ScheduledEvent>, OtterError> {
        let events = self.events.lock();
        Ok(events
            .range((bucket, DateTime::<Utc>::MIN_UTC, String::new())..)
            .take_while(|((b, _, _), _)| *b == bucket)
            .map(|(_, event)| event.clone())
            .next())
    }

    async fn insert_claim(
        &self,
        lock_id: &str,
        claim_id: Uuid,
        ttl: Duration,
    ) -> Result<(), OtterError> {
        let now = Instant::now();
        let mut claims = self.claims.lock();
        let rows = claims.entry(lock_id.to_string()).or_default();
        rows.retain(|c| c.expires_at > now);
        match rows.iter_mut().find(|c| c.claim_id == claim_id) {
            Some(existing) => existing.expires_at = now + ttl,
            None => rows.push(Claim {
                claim_id,
                inserted_at: now,
                expires_at: now + ttl,
            }),
        }
        Ok(())
    }

    async fn read_claims(&self, lock_id: &str) -> Result<Vec<Uuid>, OtterError> {
        let now = Instant::now();
        let mut claims = self.claims.lock();
        let Some(rows) = claims.get_mut(lock_id) else {
            return Ok(Vec::new());
        };
        rows.retain(|c| c.expires_at > now);
        rows.sort_by_key(|c| c.inserted_at);
        Ok(rows.iter().map(|c| c.claim_id).collect())
    }

    async fn delete_claim(&self, lock_id: &str, claim_id: Uuid) -> Result<(), OtterError> {
        let mut claims = self.claims.lock();
        if let Some(rows) = claims.get_mut(lock_id) {
            rows.retain(|c| c.claim_id != claim_id);
        }
        Ok(())
    }
}
