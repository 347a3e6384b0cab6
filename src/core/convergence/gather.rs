// src/core/convergence/gather.rs

//! Gathers one logical snapshot of the cloud: the group's servers and the
//! current nodes of its load balancers.

use super::types::{LbConfig, LbNode, NovaServer, ServerStatus};
use crate::core::errors::OtterError;
use crate::core::http::ServiceClient;
use crate::core::model::{LaunchConfig, timestamp};
use serde_json::Value;
use std::collections::BTreeSet;

/// Page size for server listing; a short page terminates the walk.
pub const SERVER_LIST_LIMIT: usize = 100;

/// Metadata key tagging a server with its owning scaling group.
pub const GROUP_METADATA_KEY: &str = "rax:auto_scaling_group_id";

/// Walks `GET /servers/detail` with marker pagination until a page comes
/// back short.
pub async fn get_all_server_details(
    compute: &ServiceClient,
    limit: usize,
) -> Result<Vec<Value>, OtterError> {
    let mut servers: Vec<Value> = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let path = match &marker {
            None => format!("servers/detail?limit={limit}"),
            Some(m) => format!("servers/detail?limit={limit}&marker={m}"),
        };
        let body = compute.get(&path).await?;
        let batch = body
            .get("servers")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let page_len = batch.len();
        marker = batch
            .last()
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        servers.extend(batch);
        if page_len < limit {
            return Ok(servers);
        }
    }
}

/// Lists the group's servers: everything tagged with the group id, parsed
/// into planner observations with the launch config's desired memberships
/// attached.
pub async fn get_scaling_group_servers(
    compute: &ServiceClient,
    group_id: &str,
    launch: &LaunchConfig,
) -> Result<Vec<NovaServer>, OtterError> {
    let desired_lbs: Vec<LbConfig> = launch
        .load_balancers
        .iter()
        .map(|spec| LbConfig::new(spec.load_balancer_id, spec.port))
        .collect();

    let all = get_all_server_details(compute, SERVER_LIST_LIMIT).await?;
    let mut owned = Vec::new();
    for raw in all {
        let tagged = raw
            .get("metadata")
            .and_then(|m| m.get(GROUP_METADATA_KEY))
            .and_then(Value::as_str)
            == Some(group_id);
        if !tagged {
            continue;
        }
        owned.push(parse_server(&raw, desired_lbs.clone())?);
    }
    Ok(owned)
}

fn parse_server(raw: &Value, desired_lbs: Vec<LbConfig>) -> Result<NovaServer, OtterError> {
    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| OtterError::Internal("server detail missing id".to_string()))?
        .to_string();

    let status = match raw.get("status").and_then(Value::as_str) {
        Some("ACTIVE") => ServerStatus::Active,
        Some("BUILD") => ServerStatus::Build,
        Some("ERROR") => ServerStatus::Error,
        _ => ServerStatus::Other,
    };

    let created = raw
        .get("created")
        .and_then(Value::as_str)
        .and_then(|ts| timestamp::from_zulu(ts).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0);

    Ok(NovaServer {
        id,
        status,
        created,
        servicenet_address: servicenet_address(raw),
        desired_lbs,
    })
}

/// The first private IPv4 address, used for load-balancer registration.
fn servicenet_address(raw: &Value) -> Option<String> {
    raw.get("addresses")?
        .get("private")?
        .as_array()?
        .iter()
        .find(|a| a.get("version").and_then(Value::as_i64) == Some(4))
        .and_then(|a| a.get("addr"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Snapshots the current nodes of every load balancer the group knows about.
pub async fn get_lb_nodes(
    load_balancer: &ServiceClient,
    lb_ids: &BTreeSet<u64>,
) -> Result<Vec<LbNode>, OtterError> {
    let mut nodes = Vec::new();
    for lb_id in lb_ids {
        let body = load_balancer
            .get(&format!("loadbalancers/{lb_id}/nodes"))
            .await?;
        let raw_nodes = body
            .get("nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for raw in raw_nodes {
            nodes.push(parse_lb_node(*lb_id, &raw)?);
        }
    }
    Ok(nodes)
}

fn parse_lb_node(lb_id: u64, raw: &Value) -> Result<LbNode, OtterError> {
    let node_id = raw
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| OtterError::Internal("LB node missing id".to_string()))?;
    let address = raw
        .get("address")
        .and_then(Value::as_str)
        .ok_or_else(|| OtterError::Internal("LB node missing address".to_string()))?
        .to_string();
    let port = raw.get("port").and_then(Value::as_u64).unwrap_or(0) as u16;

    let mut config = LbConfig::new(lb_id, port);
    if let Some(weight) = raw.get("weight").and_then(Value::as_u64) {
        config.weight = weight as u32;
    }
    if let Some(condition) = raw.get("condition") {
        config.condition = serde_json::from_value(condition.clone()).unwrap_or_default();
    }
    if let Some(node_type) = raw.get("type") {
        config.node_type = serde_json::from_value(node_type.clone()).unwrap_or_default();
    }

    Ok(LbNode {
        node_id,
        address,
        config,
    })
}
