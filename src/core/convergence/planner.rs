// src/core/convergence/planner.rs

//! The convergence planner: a pure function from one observation of the
//! world plus the desired capacity to the multiset of corrective steps.
//! Being pure, it cannot error, and applying its plan against a truthful
//! observation reaches a fixed point in one round.

use super::steps::Step;
use super::types::{LbNode, NovaServer, ServerStatus};
use std::collections::HashSet;

/// Build timeout applied when none is configured.
pub const DEFAULT_BUILD_TIMEOUT_SECS: i64 = 3600;

/// What the group wants the world to look like.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredGroupState {
    /// The prepared `server` payload each created server launches from.
    pub launch_config: serde_json::Value,
    pub desired: u32,
}

/// An unordered multiset of steps. Equality ignores emission order.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Net server capacity change this plan effects: creates minus deletes.
    pub fn capacity_delta(&self) -> i64 {
        self.steps.iter().map(Step::capacity_delta).sum()
    }

    fn count_of(&self, step: &Step) -> usize {
        self.steps.iter().filter(|s| *s == step).count()
    }
}

impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.steps.len() == other.steps.len()
            && self.steps.iter().all(|s| self.count_of(s) == other.count_of(s))
    }
}

impl FromIterator<Step> for Plan {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Plan {
            steps: iter.into_iter().collect(),
        }
    }
}

/// A server is *building* while its BUILD has not outlived the timeout, and
/// *errored* once it reports ERROR or its build has timed out. Healthy =
/// ACTIVE or building.
fn is_building(server: &NovaServer, now: i64, build_timeout: i64) -> bool {
    server.status == ServerStatus::Build && now - server.created < build_timeout
}

fn is_errored(server: &NovaServer, now: i64, build_timeout: i64) -> bool {
    match server.status {
        ServerStatus::Error => true,
        ServerStatus::Build => now - server.created >= build_timeout,
        _ => false,
    }
}

/// Every membership a server currently holds, matched by servicenet address.
fn memberships<'a>(server: &NovaServer, lb_nodes: &'a [LbNode]) -> Vec<&'a LbNode> {
    match &server.servicenet_address {
        Some(address) => lb_nodes.iter().filter(|n| n.address == *address).collect(),
        None => Vec::new(),
    }
}

/// Diffs observed servers and load-balancer nodes against the desired state
/// and emits the corrective steps.
pub fn plan(
    desired: &DesiredGroupState,
    servers: &[NovaServer],
    lb_nodes: &[LbNode],
    now: i64,
    build_timeout: i64,
) -> Plan {
    let mut steps: Vec<Step> = Vec::new();

    let errored: Vec<&NovaServer> = servers
        .iter()
        .filter(|s| is_errored(s, now, build_timeout))
        .collect();
    let building: Vec<&NovaServer> = servers
        .iter()
        .filter(|s| is_building(s, now, build_timeout))
        .collect();
    let active: Vec<&NovaServer> = servers
        .iter()
        .filter(|s| s.status == ServerStatus::Active)
        .collect();

    // Errored servers always go, along with every membership they hold.
    for server in &errored {
        steps.push(Step::DeleteServer {
            server_id: server.id.clone(),
        });
        for node in memberships(server, lb_nodes) {
            steps.push(Step::RemoveFromLoadBalancer {
                lb_id: node.config.lb_id,
                node_id: node.node_id,
            });
        }
    }

    let survivors = building.len() + active.len();
    let desired_count = desired.desired as usize;

    if survivors < desired_count {
        for _ in 0..desired_count - survivors {
            steps.push(Step::CreateServer {
                launch_config: desired.launch_config.clone(),
            });
        }
    }

    // Over capacity: shed building servers first (their age is irrelevant),
    // then the oldest active servers.
    let mut scheduled_for_deletion: HashSet<&str> = HashSet::new();
    if survivors > desired_count {
        let mut oldest_active = active.clone();
        oldest_active.sort_by_key(|s| s.created);
        let victims = building
            .iter()
            .chain(oldest_active.iter())
            .take(survivors - desired_count);
        for server in victims {
            scheduled_for_deletion.insert(server.id.as_str());
            steps.push(Step::DeleteServer {
                server_id: server.id.clone(),
            });
            for node in memberships(server, lb_nodes) {
                steps.push(Step::RemoveFromLoadBalancer {
                    lb_id: node.config.lb_id,
                    node_id: node.node_id,
                });
            }
        }
    }

    // Reconcile memberships for active servers that are staying.
    for server in active
        .iter()
        .filter(|s| !scheduled_for_deletion.contains(s.id.as_str()))
    {
        let Some(address) = &server.servicenet_address else {
            continue;
        };
        let current = memberships(server, lb_nodes);

        for want in &server.desired_lbs {
            let existing = current
                .iter()
                .find(|n| n.config.lb_id == want.lb_id && n.config.port == want.port);
            match existing {
                None => steps.push(Step::AddToLoadBalancer {
                    lb_id: want.lb_id,
                    address: address.clone(),
                    port: want.port,
                    weight: want.weight,
                    condition: want.condition,
                    node_type: want.node_type,
                }),
                Some(node)
                    if node.config.weight != want.weight
                        || node.config.condition != want.condition
                        || node.config.node_type != want.node_type =>
                {
                    steps.push(Step::ChangeLoadBalancerNode {
                        lb_id: want.lb_id,
                        node_id: node.node_id,
                        weight: want.weight,
                        condition: want.condition,
                        node_type: want.node_type,
                    });
                }
                Some(_) => {}
            }
        }

        for node in &current {
            let still_wanted = server
                .desired_lbs
                .iter()
                .any(|w| w.lb_id == node.config.lb_id && w.port == node.config.port);
            if !still_wanted {
                steps.push(Step::RemoveFromLoadBalancer {
                    lb_id: node.config.lb_id,
                    node_id: node.node_id,
                });
            }
        }
    }

    Plan { steps }
}
