//! Point-in-time node and cluster snapshots
//!
//! A collection round opens one connection per selected node, issues
//! `INFO <section>` for every configured section, and keeps the parsed
//! response together with the capture time.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info};

use super::info::{parse_info, InfoResponse};
use crate::client::{ConnectionFactory, ControlPlane, ControlPlaneExt, RetryPolicy};
use crate::cluster::{fan_out, ClusterNode, FanOutConfig, NodeFailure, NodeRole};
use crate::utils::Result;

/// INFO of one node at one point in time
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub address: String,
    pub display_name: String,
    pub role: NodeRole,
    #[serde(skip)]
    pub captured_at: Instant,
    pub captured_unix_ms: u64,
    pub info: InfoResponse,
}

impl NodeSnapshot {
    pub fn new(node: &ClusterNode, info: InfoResponse) -> Self {
        Self {
            address: node.address(),
            display_name: node.display_name(),
            role: node.role,
            captured_at: Instant::now(),
            captured_unix_ms: unix_millis(),
            info,
        }
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One collection round over the cluster
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub label: String,
    /// Successful nodes keyed by address
    pub nodes: BTreeMap<String, NodeSnapshot>,
    pub failures: Vec<NodeFailure>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ClusterSnapshot {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, address: &str) -> Option<&NodeSnapshot> {
        self.nodes.get(address)
    }
}

/// Collect the configured INFO sections from one node
pub fn collect_node<C: ControlPlane + ?Sized>(
    conn: &mut C,
    node: &ClusterNode,
    sections: &[String],
) -> Result<NodeSnapshot> {
    let text = conn.info_sections(sections)?;
    let info = parse_info(&text);
    debug!(
        "Collected {} sections from {}",
        info.sections.len(),
        node.address()
    );
    Ok(NodeSnapshot::new(node, info))
}

/// Run one collection round over `targets`
///
/// Connections are opened fresh for the round. Connection setup and the
/// INFO exchange are retried on transient errors.
pub fn collect_round(
    label: &str,
    factory: &ConnectionFactory,
    targets: Vec<ClusterNode>,
    sections: &[String],
    fan_out_config: &FanOutConfig,
    retry: &RetryPolicy,
) -> ClusterSnapshot {
    let factory = factory.clone();
    let sections: Arc<[String]> = sections.into();
    let retry = retry.clone();

    let result = fan_out(targets, fan_out_config, move |node| {
        retry.run(&format!("collect {}", node.address()), |_| {
            let mut conn = factory.create(&node.host, node.port)?;
            collect_node(&mut conn, node, &sections)
        })
    });

    let nodes: BTreeMap<String, NodeSnapshot> = result
        .successes
        .into_iter()
        .map(|(_, snapshot)| (snapshot.address.clone(), snapshot))
        .collect();

    info!(
        "{} round: {} nodes collected, {} failed in {:.2}s",
        label,
        nodes.len(),
        result.failures.len(),
        result.elapsed.as_secs_f64()
    );

    ClusterSnapshot {
        label: label.to_string(),
        nodes,
        failures: result.failures,
        elapsed: result.elapsed,
    }
}
