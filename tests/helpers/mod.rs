// tests/helpers/mod.rs

//! Shared fixtures for the test suite: an in-memory transport with canned
//! responses, store seeding, and a few converger doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use otter::core::auth::{CachingAuthenticator, Credentials, IdentityClient};
use otter::core::convergence::{ConvergenceOutcome, GroupConverger};
use otter::core::errors::OtterError;
use otter::core::http::{RawRequest, RawResponse, RetryPolicy, ServiceClient, Transport};
use otter::core::model::{
    GroupConfig, GroupKey, GroupState, GroupStatus, LaunchConfig, LoadBalancerSpec, Policy,
    ScalingGroup,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

pub const IDENTITY_ENDPOINT: &str = "http://identity.test/v2.0";
pub const COMPUTE_URL: &str = "http://compute.test/v2/777";
pub const LB_URL: &str = "http://lb.test/v1.0/777";
pub const HEAT_URL: &str = "http://heat.test/v1/777";

/// A request as the fake transport saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: Option<Value>,
}

/// In-memory transport: canned responses per `(method, url)`, every request
/// recorded. A route with several responses plays them in order and repeats
/// the last one.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(String, String), Vec<(u16, Value)>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stub(&self, method: &str, url: &str, status: u16, body: Value) {
        self.routes
            .lock()
            .entry((method.to_string(), url.to_string()))
            .or_default()
            .push((status, body));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn count_requests(&self, method: &str, url_prefix: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.url.starts_with(url_prefix))
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, OtterError> {
        let method = request.method.as_str().to_string();
        let url = request.url.to_string();
        self.requests.lock().push(RecordedRequest {
            method: method.clone(),
            url: url.clone(),
            body: request
                .body
                .as_ref()
                .and_then(|b| serde_json::from_slice(b).ok()),
        });

        let mut routes = self.routes.lock();
        let Some(queue) = routes.get_mut(&(method.clone(), url.clone())) else {
            return Err(OtterError::Transport(format!("no route for {method} {url}")));
        };
        let (status, body) = if queue.len() > 1 {
            queue.remove(0)
        } else {
            queue[0].clone()
        };
        Ok(RawResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: bytes::Bytes::from(serde_json::to_vec(&body).unwrap()),
        })
    }
}

/// The identity response body granting a token over the test services.
pub fn token_response(token: &str) -> Value {
    json!({
        "access": {
            "token": { "id": token, "tenant": { "id": "777" } },
            "serviceCatalog": [
                {
                    "name": "cloudServersOpenStack",
                    "type": "compute",
                    "endpoints": [{ "region": "ORD", "publicURL": COMPUTE_URL }]
                },
                {
                    "name": "cloudLoadBalancers",
                    "type": "rax:load-balancer",
                    "endpoints": [{ "region": "ORD", "publicURL": LB_URL }]
                },
                {
                    "name": "cloudOrchestration",
                    "type": "orchestration",
                    "endpoints": [{ "region": "ORD", "publicURL": HEAT_URL }]
                }
            ]
        }
    })
}

pub fn stub_identity(transport: &FakeTransport, token: &str) {
    transport.stub(
        "POST",
        &format!("{IDENTITY_ENDPOINT}/tokens"),
        200,
        token_response(token),
    );
}

pub fn authenticator(transport: Arc<FakeTransport>) -> Arc<CachingAuthenticator> {
    let identity = IdentityClient::new(
        transport,
        Url::parse(IDENTITY_ENDPOINT).unwrap(),
        Credentials::ApiKey {
            username: "otter".to_string(),
            api_key: "secret".to_string(),
        },
    );
    Arc::new(CachingAuthenticator::new(identity, Duration::from_secs(3600)))
}

/// A retry policy with near-zero backoff so retry tests finish quickly.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

pub fn service_client(
    transport: Arc<FakeTransport>,
    auth: Arc<CachingAuthenticator>,
    service: &str,
) -> ServiceClient {
    ServiceClient::new(transport, auth, "777", service, "ORD", fast_retry())
}

// --- Model builders ---

pub fn group(tenant: &str, group_id: &str, min: u32, max: u32, cooldown: u64) -> ScalingGroup {
    ScalingGroup {
        key: GroupKey::new(tenant, group_id),
        config: GroupConfig {
            name: format!("{group_id}-config"),
            min_entities: min,
            max_entities: Some(max),
            cooldown,
        },
        launch: LaunchConfig::launch_server(
            json!({ "name": "as-server", "flavorRef": "2", "imageRef": "img-1" }),
            vec![],
        ),
        status: GroupStatus::Active,
    }
}

pub fn group_with_lb(
    tenant: &str,
    group_id: &str,
    min: u32,
    max: u32,
    lb_id: u64,
    port: u16,
) -> ScalingGroup {
    let mut g = group(tenant, group_id, min, max, 0);
    g.launch.load_balancers = vec![LoadBalancerSpec {
        load_balancer_id: lb_id,
        port,
    }];
    g
}

pub fn state_with_desired(desired: u32) -> GroupState {
    GroupState {
        desired,
        ..GroupState::default()
    }
}

pub fn policy_change(id: &str, change: i64, cooldown: u64) -> Policy {
    Policy {
        id: id.to_string(),
        name: format!("{id}-policy"),
        cooldown,
        adjustment: otter::core::model::Adjustment::Change(change),
        schedule: None,
        version: "v1".to_string(),
    }
}

// --- Converger doubles ---

/// A converger that does nothing and always succeeds.
pub struct NoopConverger;

#[async_trait]
impl GroupConverger for NoopConverger {
    async fn converge(
        &self,
        _group: &ScalingGroup,
        _state: &GroupState,
    ) -> Result<ConvergenceOutcome, OtterError> {
        Ok(ConvergenceOutcome::noop())
    }
}

/// A converger that counts invocations.
#[derive(Default)]
pub struct CountingConverger {
    pub calls: AtomicUsize,
}

#[async_trait]
impl GroupConverger for CountingConverger {
    async fn converge(
        &self,
        _group: &ScalingGroup,
        _state: &GroupState,
    ) -> Result<ConvergenceOutcome, OtterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ConvergenceOutcome::noop())
    }
}

impl CountingConverger {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}
