// src/core/model/group.rs

//! Scaling group entities: configuration, launch template, and mutable state.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Hard cap on the number of entities any group may scale to, regardless of
/// its configured maximum.
pub const MAX_ENTITIES: u32 = 25;

/// Identifies a scaling group across tenants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub tenant_id: String,
    pub group_id: String,
}

impl GroupKey {
    pub fn new(tenant_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            group_id: group_id.into(),
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.group_id)
    }
}

/// Lifecycle status of a scaling group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupStatus {
    Active,
    Error,
    Disabled,
    Deleting,
}

/// User-facing group configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupConfig {
    pub name: String,
    pub min_entities: u32,
    /// `None` means "no configured maximum"; the hard cap still applies.
    pub max_entities: Option<u32>,
    /// Group-wide cooldown in seconds.
    pub cooldown: u64,
}

impl GroupConfig {
    /// The effective maximum: the configured maximum bounded by the hard cap.
    pub fn effective_max(&self) -> u32 {
        self.max_entities.unwrap_or(MAX_ENTITIES).min(MAX_ENTITIES)
    }
}

/// A cloud load balancer a group's servers should be members of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerSpec {
    pub load_balancer_id: u64,
    pub port: u16,
}

/// The launch template for a group. The `server` payload is opaque to the
/// controller and forwarded to the compute service verbatim (after the group
/// metadata tag is stamped in).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    #[serde(rename = "type")]
    pub launch_type: String,
    pub server: serde_json::Value,
    #[serde(default)]
    pub load_balancers: Vec<LoadBalancerSpec>,
}

impl LaunchConfig {
    pub fn launch_server(server: serde_json::Value, load_balancers: Vec<LoadBalancerSpec>) -> Self {
        Self {
            launch_type: "launch_server".to_string(),
            server,
            load_balancers,
        }
    }
}

/// An entry in the group state's `active` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActiveServer {
    #[serde(default)]
    pub links: Vec<String>,
    /// ISO-8601 Zulu creation timestamp.
    pub created: String,
}

/// The mutable, non-user-visible state of a scaling group. Mutated only under
/// the per-group serialization lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupState {
    pub desired: u32,
    #[serde(default)]
    pub active: HashMap<String, ActiveServer>,
    #[serde(default)]
    pub pending: HashSet<String>,
    /// Per-policy last-execution Zulu timestamps.
    #[serde(default)]
    pub policy_touched: HashMap<String, String>,
    /// Last any-policy Zulu timestamp.
    #[serde(default)]
    pub group_touched: Option<String>,
    #[serde(default)]
    pub paused: bool,
    /// Link to the orchestration stack, when the heat executor manages this group.
    #[serde(default)]
    pub heat_stack: Option<String>,
}

impl GroupState {
    /// Stamps both the policy-level and group-level last-execution timestamps.
    pub fn mark_executed(&mut self, policy_id: &str, now: String) {
        self.policy_touched
            .insert(policy_id.to_string(), now.clone());
        self.group_touched = Some(now);
    }

    pub fn capacity(&self) -> CapacitySnapshot {
        CapacitySnapshot {
            current_capacity: self.active.len(),
            pending_capacity: self.pending.len(),
            desired_capacity: self.desired,
        }
    }
}

/// Point-in-time capacity numbers, attached to audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CapacitySnapshot {
    pub current_capacity: usize,
    pub pending_capacity: usize,
    pub desired_capacity: u32,
}

/// A scaling group as loaded from the store: identity plus its two configs
/// and status. The mutable `GroupState` is loaded separately, under lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingGroup {
    pub key: GroupKey,
    pub config: GroupConfig,
    pub launch: LaunchConfig,
    pub status: GroupStatus,
}
