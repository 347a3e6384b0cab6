// src/server/initialization.rs

//! Handles the complete controller initialization process, from the HTTP
//! transport up to the control loops.

use super::context::ServerContext;
use crate::config::{Config, ExecutorKind, IdentityCredentialsConfig};
use crate::core::auth::{CachingAuthenticator, Credentials, IdentityClient};
use crate::core::controller::Controller;
use crate::core::convergence::{CloudClients, GroupConverger, SelfHeal, StepExecutor};
use crate::core::coordination::{InMemoryCoordination, Partitioner};
use crate::core::http::{ReqwestTransport, RetryPolicy, Transport};
use crate::core::scheduler::SchedulerService;
use crate::core::state::ControllerState;
use crate::core::store::{InMemoryStore, ScalingStore};
use crate::core::worker::HeatExecutor;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;
use url::Url;

/// Initializes all controller components before starting the control loops.
pub async fn setup(config: Config) -> Result<ServerContext> {
    let (shutdown_tx, _) = broadcast::channel(1);

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(
        config.http.timeout,
        config.http.pool_max_idle_per_host,
    )?);

    let credentials = match &config.identity.credentials {
        IdentityCredentialsConfig::Password { username, password } => Credentials::Password {
            username: username.clone(),
            password: password.clone(),
        },
        IdentityCredentialsConfig::Apikey { username, api_key } => Credentials::ApiKey {
            username: username.clone(),
            api_key: api_key.clone(),
        },
    };
    let identity = IdentityClient::new(
        transport.clone(),
        Url::parse(&config.identity.endpoint)?,
        credentials,
    );
    let authenticator = Arc::new(CachingAuthenticator::new(
        identity,
        config.identity.token_ttl,
    ));

    let retry = RetryPolicy {
        max_attempts: config.http.max_retries,
        base_delay: config.http.backoff_base,
        max_delay: config.http.backoff_max,
    };
    let clients = Arc::new(CloudClients::new(
        transport,
        authenticator,
        retry,
        &config.services.region,
        &config.services.compute,
        &config.services.load_balancer,
        &config.services.orchestration,
    ));

    // The wide-column store and the production coordination service are
    // deployment bindings; the in-process implementations carry single-node
    // runs and the test suite.
    let store: Arc<dyn ScalingStore> = Arc::new(InMemoryStore::new());
    let coordination = Arc::new(InMemoryCoordination::new());

    let converger: Arc<dyn GroupConverger> = match config.convergence.executor {
        ExecutorKind::Steps => Arc::new(StepExecutor::new(
            clients.clone(),
            config.convergence.build_timeout,
        )),
        ExecutorKind::Heat => Arc::new(HeatExecutor::new(
            clients.clone(),
            config.convergence.stack_timeout_mins,
        )),
    };
    info!(executor = ?config.convergence.executor, "convergence executor selected");

    let controller = Controller::new(store.clone(), converger, config.convergence.update_backoff);

    let partitioner = Arc::new(Partitioner::new(
        coordination.clone(),
        &config.scheduler.partition_path,
        (0..config.scheduler.buckets).collect(),
    ));
    let scheduler = SchedulerService::new(
        store.clone(),
        controller.clone(),
        partitioner,
        config.scheduler.interval,
        config.scheduler.batch_size,
        config.scheduler.health_threshold,
    );
    let selfheal = SelfHeal::new(
        controller.clone(),
        store.clone(),
        coordination.clone(),
        &config.selfheal.lock_path,
        config.selfheal.interval,
        config.selfheal.enabled_tenants.clone(),
    );

    let state = Arc::new(ControllerState {
        config,
        store,
        coordination,
        controller,
        scheduler,
        selfheal,
    });
    info!("Controller state initialized.");

    Ok(ServerContext {
        state,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}
