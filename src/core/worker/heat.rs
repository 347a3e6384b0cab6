// src/core/worker/heat.rs

//! Client for the orchestration service, and the executor variant built on
//! it.

use super::template::generate_template;
use crate::core::convergence::executor::{
    CloudClients, ConvergenceOutcome, GroupConverger, StepOutcome, prepare_launch_server_args,
};
use crate::core::errors::OtterError;
use crate::core::http::{Method, RequestOptions, ServiceClient};
use crate::core::model::{GroupState, ScalingGroup};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

/// The orchestration service rejects an update while another action runs
/// with a 400 whose error message carries this prefix, rather than a
/// conflict status.
const UPDATE_IN_PROGRESS_MESSAGE: &str =
    "Updating a stack when another action is in progress";

/// Thin client for stack create/update against the orchestration service.
pub struct HeatClient {
    client: ServiceClient,
}

impl HeatClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    /// Creates a stack and returns its self link.
    pub async fn create_stack(
        &self,
        stack_name: &str,
        template: Value,
        timeout_mins: u64,
    ) -> Result<String, OtterError> {
        let mut options = RequestOptions::with_success_codes(&[200, 201]);
        options.body = Some(json!({
            "stack_name": stack_name,
            "parameters": {},
            "timeout_mins": timeout_mins,
            "template": template,
        }));
        let body = self.client.request(Method::Post, "stacks", options).await?;
        body.get("stack")
            .and_then(|s| s.get("links"))
            .and_then(Value::as_array)
            .and_then(|links| {
                links
                    .iter()
                    .find(|l| l.get("rel").and_then(Value::as_str) == Some("self"))
            })
            .and_then(|l| l.get("href"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OtterError::Internal("stack response missing self link".to_string()))
    }

    /// Updates a stack in place. A stack mid-action surfaces as
    /// `UpdateInProgress`, whether the service says so with a 409 or with
    /// its 400-with-message variant.
    pub async fn update_stack(
        &self,
        stack_link: &str,
        template: Value,
        timeout_mins: u64,
    ) -> Result<(), OtterError> {
        let mut options = RequestOptions::with_success_codes(&[202]);
        options.body = Some(json!({
            "parameters": {},
            "timeout_mins": timeout_mins,
            "template": template,
        }));
        match self.client.request(Method::Put, stack_link, options).await {
            Ok(_) => Ok(()),
            Err(e) => Err(classify_update_error(stack_link, e)),
        }
    }
}

fn classify_update_error(stack_link: &str, error: OtterError) -> OtterError {
    match &error {
        OtterError::Api { code: 409, .. } => OtterError::UpdateInProgress(stack_link.to_string()),
        OtterError::Api { code: 400, body, .. } => {
            let in_progress = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|parsed| {
                    parsed
                        .get("error")?
                        .get("message")?
                        .as_str()
                        .map(|m| m.starts_with(UPDATE_IN_PROGRESS_MESSAGE))
                })
                .unwrap_or(false);
            if in_progress {
                OtterError::UpdateInProgress(stack_link.to_string())
            } else {
                error
            }
        }
        _ => error,
    }
}

/// The orchestration executor: renders the whole group as a stack template
/// and delegates slot management to the orchestration service. Honors the
/// same `converge(group)` contract as the step executor.
pub struct HeatExecutor {
    clients: Arc<CloudClients>,
    stack_timeout_mins: u64,
}

impl HeatExecutor {
    pub fn new(clients: Arc<CloudClients>, stack_timeout_mins: u64) -> Self {
        Self {
            clients,
            stack_timeout_mins,
        }
    }
}

#[async_trait]
impl GroupConverger for HeatExecutor {
    async fn converge(
        &self,
        group: &ScalingGroup,
        state: &GroupState,
    ) -> Result<ConvergenceOutcome, OtterError> {
        let heat = HeatClient::new(self.clients.orchestration(&group.key.tenant_id));
        let template = generate_template(&prepare_launch_server_args(group), state.desired);

        match &state.heat_stack {
            Some(link) => {
                heat.update_stack(link, template, self.stack_timeout_mins)
                    .await?;
                info!(group = %group.key, stack = %link, "stack update submitted");
                Ok(ConvergenceOutcome {
                    worst: StepOutcome::Success,
                    steps_dispatched: 1,
                    delta: 0,
                    new_heat_stack: None,
                    observed: None,
                })
            }
            None => {
                // Stack names must start with a letter and stay within
                // alphanumerics plus `_-.`, so the group id is prefixed.
                let stack_name = format!("otter-{}-{}", group.key.group_id, uuid::Uuid::new_v4());
                let link = heat
                    .create_stack(&stack_name, template, self.stack_timeout_mins)
                    .await?;
                info!(group = %group.key, stack = %link, "stack created");
                Ok(ConvergenceOutcome {
                    worst: StepOutcome::Success,
                    steps_dispatched: 1,
                    delta: 0,
                    new_heat_stack: Some(link),
                    observed: None,
                })
            }
        }
    }
}
