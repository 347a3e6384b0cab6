// src/core/model/event.rs

//! Scheduled policy-execution events, sharded into buckets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored trigger for a scheduled policy execution. Keyed by
/// `(bucket, trigger, policy_id)`; events with a `cron` are re-added at the
/// next occurrence after firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEvent {
    pub tenant_id: String,
    pub group_id: String,
    pub policy_id: String,
    pub trigger: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    pub bucket: u32,
    pub version: String,
}

impl ScheduledEvent {
    /// The successor of a cron event, due at `next_trigger`. One-shot events
    /// have no successor.
    pub fn successor(&self, next_trigger: DateTime<Utc>) -> Option<ScheduledEvent> {
        self.cron.as_ref()?;
        let mut next = self.clone();
        next.trigger = next_trigger;
        Some(next)
    }
}
