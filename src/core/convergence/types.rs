// src/core/convergence/types.rs

//! Transient observation snapshots: compute servers and load-balancer nodes
//! as seen during one convergence pass.

use serde::{Deserialize, Serialize};

/// Compute server lifecycle status, as reported by the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServerStatus {
    Active,
    Build,
    Error,
    #[serde(other)]
    Other,
}

/// Node condition on a cloud load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeCondition {
    #[default]
    Enabled,
    Disabled,
    Draining,
}

/// Node role on a cloud load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    #[default]
    Primary,
    Secondary,
}

/// A desired or observed load-balancer membership configuration. Only the
/// `(lb_id, port)` pair is identity; weight, condition, and type default to
/// `1 / ENABLED / PRIMARY` and are reconciled in place when they drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbConfig {
    pub lb_id: u64,
    pub port: u16,
    pub weight: u32,
    pub condition: NodeCondition,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

impl LbConfig {
    pub fn new(lb_id: u64, port: u16) -> Self {
        Self {
            lb_id,
            port,
            weight: 1,
            condition: NodeCondition::default(),
            node_type: NodeType::default(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// An observed load-balancer node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbNode {
    pub node_id: u64,
    pub address: String,
    pub config: LbConfig,
}

/// An observed compute server, reduced to what the planner needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovaServer {
    pub id: String,
    pub status: ServerStatus,
    /// Creation time in epoch seconds.
    pub created: i64,
    /// Internal IPv4 used to register the server with load balancers.
    /// Servers without one contribute no load-balancer steps.
    pub servicenet_address: Option<String>,
    /// The memberships this server should hold, from the launch config.
    pub desired_lbs: Vec<LbConfig>,
}

impl NovaServer {
    pub fn new(id: impl Into<String>, status: ServerStatus, created: i64) -> Self {
        Self {
            id: id.into(),
            status,
            created,
            servicenet_address: None,
            desired_lbs: Vec::new(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.servicenet_address = Some(address.into());
        self
    }

    pub fn with_desired_lbs(mut self, desired: Vec<LbConfig>) -> Self {
        self.desired_lbs = desired;
        self
    }
}
