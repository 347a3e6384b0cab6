// src/core/model/policy.rs

//! Scaling policies and the webhook capabilities that execute them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How a policy adjusts the desired capacity. Serialized externally tagged,
/// so the wire shape is `{"change": -2}`, `{"changePercent": 50.0}`, or
/// `{"desiredCapacity": 5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Adjustment {
    /// Signed absolute delta.
    Change(i64),
    /// Signed percentage of the current desired, rounded away from zero.
    ChangePercent(f64),
    /// Absolute target capacity.
    DesiredCapacity(u32),
}

/// Optional schedule attached to a policy: a one-shot instant or a cron
/// recurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Schedule {
    /// ISO-8601 Zulu instant.
    At(String),
    /// Five-field cron expression.
    Cron(String),
}

/// A scaling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub name: String,
    /// Per-policy cooldown in seconds.
    pub cooldown: u64,
    #[serde(flatten)]
    pub adjustment: Adjustment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Version token, regenerated whenever the policy is updated. Scheduled
    /// events carry the version they were created against.
    pub version: String,
}

/// An opaque capability resolving to a `(group, policy)` pair with anonymous
/// execution rights. Only generation lives here; the REST surface consuming
/// capability URLs is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub id: String,
    pub policy_id: String,
    pub capability_hash: String,
}

impl Webhook {
    /// Mints a webhook for a policy with a fresh, unguessable capability hash.
    pub fn mint(policy_id: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let token = uuid::Uuid::new_v4();
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self {
            id,
            policy_id: policy_id.into(),
            capability_hash: hex::encode(hasher.finalize()),
        }
    }
}
