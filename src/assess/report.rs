//! Assessment report model

use serde::Serialize;

use crate::cluster::{ClusterTopology, NodeFailure, NodeRole, TopologyDiff, TopologyMode};
use crate::config::NodeScope;
use crate::metrics::{
    AggregatedField, ClusterTotals, CommandTotal, KeyspaceSample, NodeDelta,
};

/// How the run was configured and when it happened
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub tool_version: String,
    pub seeds: Vec<String>,
    pub scope: NodeScope,
    pub sections: Vec<String>,
    pub requested_duration_secs: u64,
    /// Wall time between the two rounds
    pub measured_secs: f64,
    pub ecpu_baseline_usec: f64,
    pub started_unix_ms: u64,
    pub finished_unix_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub address: String,
    pub display_name: String,
    pub role: NodeRole,
    pub slots: usize,
    pub available: bool,
}

/// Topology as seen at the start of the run
#[derive(Debug, Clone, Serialize)]
pub struct TopologySummary {
    pub mode: TopologyMode,
    pub primaries: usize,
    pub replicas: usize,
    pub nodes: Vec<NodeSummary>,
}

impl TopologySummary {
    pub fn from_topology(topology: &ClusterTopology) -> Self {
        let mut nodes: Vec<NodeSummary> = topology
            .nodes
            .iter()
            .map(|n| NodeSummary {
                address: n.address(),
                display_name: n.display_name(),
                role: n.role,
                slots: n.slot_count(),
                available: n.is_available(),
            })
            .collect();
        nodes.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        Self {
            mode: topology.mode,
            primaries: topology.num_primaries(),
            replicas: topology.replicas().count(),
            nodes,
        }
    }
}

/// A node failure tagged with the round it happened in
#[derive(Debug, Clone, Serialize)]
pub struct RoundFailure {
    pub round: String,
    #[serde(flatten)]
    pub failure: NodeFailure,
}

/// Full result of one assessment run
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    pub metadata: RunMetadata,
    pub topology: TopologySummary,
    pub nodes: Vec<NodeDelta>,
    pub totals: ClusterTotals,
    pub fields: Vec<AggregatedField>,
    pub top_commands: Vec<CommandTotal>,
    pub topology_changes: TopologyDiff,
    /// Nodes answering only in the final round; not part of totals
    pub first_seen_nodes: Vec<String>,
    pub failures: Vec<RoundFailure>,
    pub keyspace_samples: Vec<KeyspaceSample>,
}

impl AssessmentReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}
