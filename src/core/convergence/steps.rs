// src/core/convergence/steps.rs

//! Corrective steps emitted by the planner, and their mapping onto HTTP
//! requests against the cloud services.

use super::types::{NodeCondition, NodeType};
use crate::core::http::Method;
use serde_json::json;

/// A single corrective action. Plans are unordered multisets of these.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    CreateServer {
        /// The prepared `server` payload of the launch config.
        launch_config: serde_json::Value,
    },
    DeleteServer {
        server_id: String,
    },
    AddToLoadBalancer {
        lb_id: u64,
        address: String,
        port: u16,
        weight: u32,
        condition: NodeCondition,
        node_type: NodeType,
    },
    ChangeLoadBalancerNode {
        lb_id: u64,
        node_id: u64,
        weight: u32,
        condition: NodeCondition,
        node_type: NodeType,
    },
    RemoveFromLoadBalancer {
        lb_id: u64,
        node_id: u64,
    },
}

/// Which external service a step's request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceTarget {
    Compute,
    LoadBalancer,
}

/// A step rendered into request form, ready for a bound client.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    pub service: ServiceTarget,
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub success_codes: Vec<u16>,
}

impl Step {
    /// Renders the step as an HTTP request with its per-step success codes.
    pub fn as_request(&self) -> StepRequest {
        match self {
            Step::CreateServer { launch_config } => StepRequest {
                service: ServiceTarget::Compute,
                method: Method::Post,
                path: "servers".to_string(),
                body: Some(json!({ "server": launch_config })),
                success_codes: vec![201, 202],
            },
            Step::DeleteServer { server_id } => StepRequest {
                service: ServiceTarget::Compute,
                method: Method::Delete,
                path: format!("servers/{server_id}"),
                body: None,
                success_codes: vec![202, 204],
            },
            Step::AddToLoadBalancer {
                lb_id,
                address,
                port,
                weight,
                condition,
                node_type,
            } => StepRequest {
                service: ServiceTarget::LoadBalancer,
                method: Method::Post,
                path: format!("loadbalancers/{lb_id}/nodes"),
                body: Some(json!({
                    "nodes": [{
                        "address": address,
                        "port": port,
                        "weight": weight,
                        "condition": condition,
                        "type": node_type,
                    }]
                })),
                success_codes: vec![200, 202],
            },
            Step::ChangeLoadBalancerNode {
                lb_id,
                node_id,
                weight,
                condition,
                node_type,
            } => StepRequest {
                service: ServiceTarget::LoadBalancer,
                method: Method::Put,
                path: format!("loadbalancers/{lb_id}/nodes/{node_id}"),
                body: Some(json!({
                    "node": {
                        "weight": weight,
                        "condition": condition,
                        "type": node_type,
                    }
                })),
                success_codes: vec![200, 202],
            },
            Step::RemoveFromLoadBalancer { lb_id, node_id } => StepRequest {
                service: ServiceTarget::LoadBalancer,
                method: Method::Delete,
                path: format!("loadbalancers/{lb_id}/nodes/{node_id}"),
                body: None,
                success_codes: vec![200, 202, 204],
            },
        }
    }

    /// Signed contribution of this step to server capacity.
    pub fn capacity_delta(&self) -> i64 {
        match self {
            Step::CreateServer { .. } => 1,
            Step::DeleteServer { .. } => -1,
            _ => 0,
        }
    }
}
