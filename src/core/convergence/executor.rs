// src/core/convergence/executor.rs

//! The convergence executor: gathers observations, invokes the planner, and
//! dispatches every step request in parallel. There is no intra-plan
//! ordering; a plan with conflicting steps means the observation was
//! inconsistent and the next pass re-converges.

use super::gather;
use super::planner::{self, DesiredGroupState, Plan};
use super::steps::{ServiceTarget, Step};
use super::types::{NovaServer, ServerStatus};
use crate::core::auth::CachingAuthenticator;
use crate::core::errors::OtterError;
use crate::core::http::{RequestOptions, RetryPolicy, ServiceClient, Transport};
use crate::core::model::{ActiveServer, GroupState, ScalingGroup, timestamp};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Names under which the cloud services appear in tenants' catalogs, plus
/// the shared request machinery to reach them.
pub struct CloudClients {
    transport: Arc<dyn Transport>,
    authenticator: Arc<CachingAuthenticator>,
    retry: RetryPolicy,
    region: String,
    compute_service: String,
    load_balancer_service: String,
    orchestration_service: String,
}

impl CloudClients {
    pub fn new(
        transport: Arc<dyn Transport>,
        authenticator: Arc<CachingAuthenticator>,
        retry: RetryPolicy,
        region: impl Into<String>,
        compute_service: impl Into<String>,
        load_balancer_service: impl Into<String>,
        orchestration_service: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            authenticator,
            retry,
            region: region.into(),
            compute_service: compute_service.into(),
            load_balancer_service: load_balancer_service.into(),
            orchestration_service: orchestration_service.into(),
        }
    }

    /// A request function bound to `tenant_id`'s view of the target service.
    pub fn bound(&self, tenant_id: &str, target: ServiceTarget) -> ServiceClient {
        let service = match target {
            ServiceTarget::Compute => &self.compute_service,
            ServiceTarget::LoadBalancer => &self.load_balancer_service,
        };
        ServiceClient::new(
            self.transport.clone(),
            self.authenticator.clone(),
            tenant_id,
            service,
            &self.region,
            self.retry.clone(),
        )
    }

    pub fn orchestration(&self, tenant_id: &str) -> ServiceClient {
        ServiceClient::new(
            self.transport.clone(),
            self.authenticator.clone(),
            tenant_id,
            &self.orchestration_service,
            &self.region,
            self.retry.clone(),
        )
    }
}

/// Per-step result classification. Variants order worst-last so the overall
/// pass outcome is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StepOutcome {
    Success,
    Retry,
    Failure,
}

/// The server picture a pass observed: ACTIVE servers and still-building
/// ones. Written back into the group state so capacity snapshots track the
/// cloud rather than going stale.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservedGroup {
    pub active: HashMap<String, ActiveServer>,
    pub pending: HashSet<String>,
}

/// Partitions one observation into the `active` map and `pending` set of
/// the group state. Timed-out builds and errored servers are on their way
/// out and count toward neither.
pub fn observe_group_state(servers: &[NovaServer], now: i64, build_timeout: i64) -> ObservedGroup {
    let mut observed = ObservedGroup::default();
    for server in servers {
        match server.status {
            ServerStatus::Active => {
                let created = chrono::DateTime::from_timestamp(server.created, 0)
                    .map(timestamp::to_zulu)
                    .unwrap_or_else(|| timestamp::MIN.to_string());
                observed.active.insert(
                    server.id.clone(),
                    ActiveServer {
                        links: Vec::new(),
                        created,
                    },
                );
            }
            ServerStatus::Build if now - server.created < build_timeout => {
                observed.pending.insert(server.id.clone());
            }
            _ => {}
        }
    }
    observed
}

/// The aggregate result of one convergence pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceOutcome {
    pub worst: StepOutcome,
    pub steps_dispatched: usize,
    /// Net capacity change the plan asked for: creates minus deletes.
    pub delta: i64,
    /// Set by the orchestration executor when it creates a new stack.
    pub new_heat_stack: Option<String>,
    /// The observed server picture, persisted back into the group state.
    pub observed: Option<ObservedGroup>,
}

impl ConvergenceOutcome {
    pub fn noop() -> Self {
        Self {
            worst: StepOutcome::Success,
            steps_dispatched: 0,
            delta: 0,
            new_heat_stack: None,
            observed: None,
        }
    }
}

/// The single contract both executor variants honor.
#[async_trait]
pub trait GroupConverger: Send + Sync {
    async fn converge(
        &self,
        group: &ScalingGroup,
        state: &GroupState,
    ) -> Result<ConvergenceOutcome, OtterError>;
}

/// The direct executor: observation, plan, one HTTP request per step.
pub struct StepExecutor {
    clients: Arc<CloudClients>,
    build_timeout: Duration,
}

impl StepExecutor {
    pub fn new(clients: Arc<CloudClients>, build_timeout: Duration) -> Self {
        Self {
            clients,
            build_timeout,
        }
    }

    async fn dispatch(
        &self,
        compute: &ServiceClient,
        load_balancer: &ServiceClient,
        step: &Step,
    ) -> StepOutcome {
        let request = step.as_request();
        let client = match request.service {
            ServiceTarget::Compute => compute,
            ServiceTarget::LoadBalancer => load_balancer,
        };
        let mut options = RequestOptions::with_success_codes(&request.success_codes);
        options.body = request.body;

        let result = client.request(request.method, &request.path, options).await;
        classify_step_result(step, result)
    }
}

/// Maps a step's request result onto an outcome. Node-address collisions on
/// a load-balancer add mean the membership already exists: idempotent success.
fn classify_step_result(
    step: &Step,
    result: Result<serde_json::Value, OtterError>,
) -> StepOutcome {
    match result {
        Ok(_) => StepOutcome::Success,
        Err(OtterError::Api { code: 422, body, .. })
            if matches!(step, Step::AddToLoadBalancer { .. })
                && body.contains("Duplicate") =>
        {
            StepOutcome::Success
        }
        Err(OtterError::Api { code: 429, .. })
        | Err(OtterError::Transport(_))
        | Err(OtterError::AuthenticationUnavailable(_)) => {
            debug!(?step, "step hit a transient failure; pass will retry");
            StepOutcome::Retry
        }
        Err(error) => {
            warn!(?step, %error, "step failed");
            StepOutcome::Failure
        }
    }
}

/// Stamps the group ownership tag into the launch template's metadata, so
/// created servers are found by the next observation.
pub fn prepare_launch_server_args(group: &ScalingGroup) -> serde_json::Value {
    let mut server = group.launch.server.clone();
    if !server.is_object() {
        server = serde_json::json!({});
    }
    let metadata = server
        .as_object_mut()
        .expect("server args object")
        .entry("metadata")
        .or_insert_with(|| serde_json::json!({}));
    if let Some(map) = metadata.as_object_mut() {
        map.insert(
            gather::GROUP_METADATA_KEY.to_string(),
            serde_json::Value::String(group.key.group_id.clone()),
        );
    }
    server
}

/// Emits the audit record for a capacity-changing pass.
pub fn audit_convergence(group: &ScalingGroup, state: &GroupState, plan: &Plan) {
    let delta = plan.capacity_delta();
    if delta == 0 {
        return;
    }
    let capacity = state.capacity();
    if delta < 0 {
        info!(
            event_type = "convergence.scale_down",
            tenant_id = %group.key.tenant_id,
            scaling_group_id = %group.key.group_id,
            convergence_delta = delta,
            current_capacity = capacity.current_capacity,
            pending_capacity = capacity.pending_capacity,
            desired_capacity = capacity.desired_capacity,
            "Deleting {} servers to satisfy desired capacity",
            -delta
        );
    } else {
        info!(
            event_type = "convergence.scale_up",
            tenant_id = %group.key.tenant_id,
            scaling_group_id = %group.key.group_id,
            convergence_delta = delta,
            current_capacity = capacity.current_capacity,
            pending_capacity = capacity.pending_capacity,
            desired_capacity = capacity.desired_capacity,
            "Starting {} new servers to satisfy desired capacity",
            delta
        );
    }
}

#[async_trait]
impl GroupConverger for StepExecutor {
    async fn converge(
        &self,
        group: &ScalingGroup,
        state: &GroupState,
    ) -> Result<ConvergenceOutcome, OtterError> {
        let tenant_id = &group.key.tenant_id;
        let compute = self.clients.bound(tenant_id, ServiceTarget::Compute);
        let load_balancer = self.clients.bound(tenant_id, ServiceTarget::LoadBalancer);

        let servers =
            gather::get_scaling_group_servers(&compute, &group.key.group_id, &group.launch).await?;
        let lb_ids: BTreeSet<u64> = group
            .launch
            .load_balancers
            .iter()
            .map(|spec| spec.load_balancer_id)
            .collect();
        let lb_nodes = gather::get_lb_nodes(&load_balancer, &lb_ids).await?;

        let desired = DesiredGroupState {
            launch_config: prepare_launch_server_args(group),
            desired: state.desired,
        };
        let now = chrono::Utc::now().timestamp();
        let build_timeout = self.build_timeout.as_secs() as i64;
        let plan = planner::plan(&desired, &servers, &lb_nodes, now, build_timeout);

        // Audit against the capacity the pass actually saw, not whatever the
        // stored state last held.
        let observed = observe_group_state(&servers, now, build_timeout);
        let mut refreshed = state.clone();
        refreshed.active = observed.active.clone();
        refreshed.pending = observed.pending.clone();
        audit_convergence(group, &refreshed, &plan);

        if plan.is_empty() {
            return Ok(ConvergenceOutcome {
                observed: Some(observed),
                ..ConvergenceOutcome::noop()
            });
        }

        let outcomes = join_all(
            plan.steps()
                .iter()
                .map(|step| self.dispatch(&compute, &load_balancer, step)),
        )
        .await;
        let worst = outcomes
            .iter()
            .copied()
            .max()
            .unwrap_or(StepOutcome::Success);

        info!(
            tenant_id = %tenant_id,
            scaling_group_id = %group.key.group_id,
            steps = plan.len(),
            worst = ?worst,
            "Got result of {:?} after executing convergence", worst
        );

        Ok(ConvergenceOutcome {
            worst,
            steps_dispatched: plan.len(),
            delta: plan.capacity_delta(),
            new_heat_stack: None,
            observed: Some(observed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::convergence::types::NodeCondition;
    use crate::core::convergence::types::NodeType;

    fn add_step() -> Step {
        Step::AddToLoadBalancer {
            lb_id: 5,
            address: "1.1.1.1".to_string(),
            port: 80,
            weight: 1,
            condition: NodeCondition::Enabled,
            node_type: NodeType::Primary,
        }
    }

    fn api_error(code: u16, body: &str) -> OtterError {
        OtterError::Api {
            code,
            body: body.to_string(),
            headers: vec![],
        }
    }

    #[test]
    fn test_node_address_collision_is_idempotent_success() {
        let body = r#"{"message": "Duplicate nodes detected. One or more nodes already configured on load balancer."}"#;
        let outcome = classify_step_result(&add_step(), Err(api_error(422, body)));
        assert_eq!(outcome, StepOutcome::Success);
    }

    #[test]
    fn test_collision_body_only_excuses_lb_adds() {
        let delete = Step::DeleteServer {
            server_id: "abc".to_string(),
        };
        assert_eq!(
            classify_step_result(&delete, Err(api_error(422, "Duplicate"))),
            StepOutcome::Failure
        );
        // A 422 without the collision marker is a plain failure.
        assert_eq!(
            classify_step_result(&add_step(), Err(api_error(422, "Out of virtual IPs"))),
            StepOutcome::Failure
        );
    }

    #[test]
    fn test_transient_failures_classify_as_retry() {
        assert_eq!(
            classify_step_result(&add_step(), Err(api_error(429, ""))),
            StepOutcome::Retry
        );
        assert_eq!(
            classify_step_result(&add_step(), Err(OtterError::Transport("reset".to_string()))),
            StepOutcome::Retry
        );
    }

    #[test]
    fn test_observed_state_feeds_the_capacity_snapshot() {
        let servers = [
            NovaServer::new("a", ServerStatus::Active, 0),
            NovaServer::new("b", ServerStatus::Build, 50),
            NovaServer::new("slow", ServerStatus::Build, 0),
            NovaServer::new("dead", ServerStatus::Error, 0),
        ];
        let observed = observe_group_state(&servers, 3600, 3600);

        assert!(observed.active.contains_key("a"));
        assert_eq!(observed.active.len(), 1);
        assert!(observed.pending.contains("b"));
        assert_eq!(observed.pending.len(), 1);

        let mut state = GroupState {
            desired: 3,
            ..GroupState::default()
        };
        state.active = observed.active;
        state.pending = observed.pending;
        let capacity = state.capacity();
        assert_eq!(capacity.current_capacity, 1);
        assert_eq!(capacity.pending_capacity, 1);
        assert_eq!(capacity.desired_capacity, 3);
    }
}
