//! Cluster topology and node fan-out
//!
//! This module provides:
//! - Topology discovery via CLUSTER NODES, with a standalone fallback
//! - Shard naming and node selection by scope
//! - Topology comparison between collection rounds
//! - A bounded worker pool that runs one task per node

pub mod discovery;
pub mod fanout;
pub mod node;
pub mod topology;

pub use discovery::{discover_from, discover_topology};
pub use fanout::{fan_out, FailureKind, FanOutConfig, FanOutResult, NodeFailure};
pub use node::{ClusterNode, NodeRole, SlotRange};
pub use topology::{
    AvailabilityChange, ClusterTopology, RoleChange, SlotMove, TopologyDiff, TopologyMode,
};
