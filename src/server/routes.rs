//! REST handlers

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{ApiError, ServerState};
use crate::assess::{AssessmentReport, Orchestrator, TopologySummary};
use crate::client::{ControlPlane, ControlPlaneExt};
use crate::cluster::{discover_topology, ClusterTopology, NodeFailure, NodeRole};
use crate::config::ServerAddress;
use crate::metrics::{collect_round, default_info_fields, ClusterSnapshot, CommandStat};
use crate::utils::{AssessError, ClusterError, Result};

const DEFAULT_DELTA_SECS: u64 = 5;
const MAX_DELTA_SECS: u64 = 300;

/// Commands that take no subcommand and only read
const ALLOWED_COMMANDS: &[&str] = &["PING", "INFO", "DBSIZE", "TYPE", "TTL", "PTTL", "EXISTS", "SCAN"];

/// Read-only subcommands of container commands
const ALLOWED_SUBCOMMANDS: &[(&str, &[&str])] = &[
    ("CLUSTER", &["INFO", "NODES", "SHARDS", "SLOTS"]),
    ("CONFIG", &["GET"]),
    ("SLOWLOG", &["GET", "LEN"]),
    ("CLIENT", &["LIST", "INFO"]),
    ("MEMORY", &["STATS", "DOCTOR", "USAGE"]),
    ("LATENCY", &["LATEST", "DOCTOR"]),
    ("COMMAND", &["COUNT", "INFO"]),
];

/// Whether `args` is a read-only command the pass-through accepts
pub fn is_allowed(args: &[String]) -> bool {
    let Some(name) = args.first() else {
        return false;
    };
    let name = name.to_ascii_uppercase();

    if ALLOWED_COMMANDS.contains(&name.as_str()) {
        return true;
    }
    let Some((_, subs)) = ALLOWED_SUBCOMMANDS.iter().find(|(cmd, _)| *cmd == name) else {
        return false;
    };
    args.get(1)
        .map(|sub| subs.contains(&sub.to_ascii_uppercase().as_str()))
        .unwrap_or(false)
}

/// Validate the `duration` query parameter of `/delta`
pub fn delta_duration(requested: Option<u64>) -> std::result::Result<Duration, ApiError> {
    let secs = requested.unwrap_or(DEFAULT_DELTA_SECS);
    if !(1..=MAX_DELTA_SECS).contains(&secs) {
        return Err(ApiError::BadRequest(format!(
            "duration must be between 1 and {} seconds",
            MAX_DELTA_SECS
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Run blocking work off the async executor
async fn blocking<T, F>(f: F) -> std::result::Result<T, ApiError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Discover through the shared seeds and cache the result
fn refresh_topology(state: &ServerState) -> Result<ClusterTopology> {
    let config = &state.config;
    let topology = discover_topology(
        &config.connection_factory(),
        &state.seeds(),
        &config.retry_policy(),
    )?;
    *state.topology.write() = Some(topology.clone());
    Ok(topology)
}

/// One collection round over the configured scope
fn snapshot_round(state: &ServerState, label: &str, sections: &[String]) -> Result<ClusterSnapshot> {
    let config = &state.config;
    let topology = refresh_topology(state)?;
    let targets = topology.select(config.scope).into_iter().cloned().collect();
    Ok(collect_round(
        label,
        &config.connection_factory(),
        targets,
        sections,
        &config.fan_out_config(),
        &config.retry_policy(),
    ))
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "service": "valkey-assess",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "GET /topology",
            "GET /metrics",
            "GET /commandstats",
            "GET /delta?duration=N",
            "POST /command",
        ],
    }))
}

pub async fn health(State(state): State<Arc<ServerState>>) -> std::result::Result<Json<Value>, ApiError> {
    let seed = blocking(move || {
        let factory = state.config.connection_factory();
        let mut failures = Vec::new();
        for seed in state.seeds() {
            let pong = factory
                .create(&seed.host, seed.port)
                .and_then(|mut conn| conn.ping());
            match pong {
                Ok(true) => {
                    *state.last_seed.write() = Some(seed.clone());
                    return Ok(seed);
                }
                Ok(false) => failures.push(format!("{}: unexpected PING reply", seed)),
                Err(e) => failures.push(format!("{}: {}", seed, e)),
            }
        }
        Err(ClusterError::NoReachableSeed(failures.join("; ")).into())
    })
    .await?;

    Ok(Json(json!({ "status": "ok", "seed": seed.to_string() })))
}

pub async fn topology(
    State(state): State<Arc<ServerState>>,
) -> std::result::Result<Json<TopologySummary>, ApiError> {
    let topology = blocking(move || refresh_topology(&state)).await?;
    Ok(Json(TopologySummary::from_topology(&topology)))
}

#[derive(Debug, Serialize)]
pub struct NodeMetrics {
    pub address: String,
    pub display_name: String,
    pub role: NodeRole,
    /// Sum of `keys=` over the keyspace section
    pub keys: u64,
    pub values: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub captured_unix_ms: u64,
    pub nodes: Vec<NodeMetrics>,
    pub failures: Vec<NodeFailure>,
}

pub async fn metrics(
    State(state): State<Arc<ServerState>>,
) -> std::result::Result<Json<MetricsResponse>, ApiError> {
    let snapshot = blocking(move || {
        let sections = state.config.sections.clone();
        snapshot_round(&state, "metrics", &sections)
    })
    .await?;

    let fields = default_info_fields();
    let nodes = snapshot
        .nodes
        .into_values()
        .map(|node| {
            let values = fields
                .iter()
                .filter(|f| f.node_filter.includes(node.role))
                .filter_map(|f| f.read(&node.info).map(|v| (f.name.clone(), v)))
                .collect();
            NodeMetrics {
                keys: node.info.total_keys(),
                address: node.address,
                display_name: node.display_name,
                role: node.role,
                values,
            }
        })
        .collect();

    Ok(Json(MetricsResponse {
        captured_unix_ms: crate::metrics::snapshot::unix_millis(),
        nodes,
        failures: snapshot.failures,
    }))
}

#[derive(Debug, Serialize)]
pub struct NodeCommandStats {
    pub address: String,
    pub display_name: String,
    pub role: NodeRole,
    pub commands: BTreeMap<String, CommandStat>,
}

#[derive(Debug, Serialize)]
pub struct CommandStatsResponse {
    pub nodes: Vec<NodeCommandStats>,
    pub failures: Vec<NodeFailure>,
}

pub async fn command_stats(
    State(state): State<Arc<ServerState>>,
) -> std::result::Result<Json<CommandStatsResponse>, ApiError> {
    let snapshot = blocking(move || {
        snapshot_round(&state, "commandstats", &["commandstats".to_string()])
    })
    .await?;

    let nodes = snapshot
        .nodes
        .into_values()
        .map(|node| NodeCommandStats {
            commands: node.info.command_stats(),
            address: node.address,
            display_name: node.display_name,
            role: node.role,
        })
        .collect();

    Ok(Json(CommandStatsResponse {
        nodes,
        failures: snapshot.failures,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeltaQuery {
    pub duration: Option<u64>,
}

pub async fn delta(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<DeltaQuery>,
) -> std::result::Result<Json<AssessmentReport>, ApiError> {
    let duration = delta_duration(query.duration)?;
    info!("Delta requested over {}s", duration.as_secs());

    let report = blocking(move || {
        let mut config = state.config.with_duration(duration);
        config.seeds = state.seeds();
        Orchestrator::new(config).with_progress(false).run()
    })
    .await?;

    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// `host:port` of the target; the first reachable seed when absent
    pub node: Option<String>,
    pub args: Vec<String>,
}

pub async fn command(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<CommandRequest>,
) -> std::result::Result<Json<Value>, ApiError> {
    if request.args.is_empty() {
        return Err(ApiError::BadRequest("args must not be empty".to_string()));
    }
    if !is_allowed(&request.args) {
        return Err(ApiError::Forbidden(format!(
            "command not allowed: {}",
            request.args.join(" ")
        )));
    }
    let target = match &request.node {
        Some(node) => Some(
            node.parse::<ServerAddress>()
                .map_err(|e| ApiError::BadRequest(format!("invalid node '{}': {}", node, e)))?,
        ),
        None => None,
    };

    let (node, reply) = blocking(move || {
        let target = match target {
            Some(addr) => resolve_node(&state, addr)?,
            None => state
                .seeds()
                .into_iter()
                .next()
                .ok_or_else(|| AssessError::Config("no seed configured".to_string()))?,
        };
        debug!("Pass-through to {}: {}", target, request.args.join(" "));

        let mut conn = state.config.connection_factory().create(&target.host, target.port)?;
        let args: Vec<&str> = request.args.iter().map(String::as_str).collect();
        let reply = conn.execute(&args)?;
        Ok((target, reply))
    })
    .await?;

    Ok(Json(json!({
        "node": node.to_string(),
        "reply": reply.to_json(),
    })))
}

/// Only nodes of the known topology may be targeted
fn resolve_node(state: &ServerState, addr: ServerAddress) -> Result<ServerAddress> {
    let address = addr.to_string();
    let known = state
        .topology
        .read()
        .as_ref()
        .map(|t| t.get_node_by_address(&address).is_some())
        .unwrap_or(false);
    if known {
        return Ok(addr);
    }

    let topology = refresh_topology(state)?;
    if topology.get_node_by_address(&address).is_some() {
        Ok(addr)
    } else {
        Err(ClusterError::NodeNotFound(address).into())
    }
}
