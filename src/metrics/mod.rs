//! Metrics collection, delta computation and reporting
//!
//! This module provides:
//! - INFO parsing with typed commandstats and keyspace accessors
//! - Configurable tracked INFO fields
//! - Per-node snapshots collected over the fan-out pool
//! - Counter deltas with wraparound, reset and restart handling
//! - ECPU estimation
//! - Keyspace sampling
//! - Text/JSON/CSV export

pub mod delta;
pub mod ecpu;
pub mod info;
pub mod info_fields;
pub mod reporter;
pub mod sampler;
pub mod snapshot;

pub use delta::{
    aggregate_fields, compute_node_delta, counter_delta, top_commands, AggregatedField,
    ClusterTotals, CommandDelta, CommandTotal, CounterDelta, FieldDelta, NodeDelta,
};
pub use ecpu::{classify_command, CommandCategory, EcpuEstimate, EcpuModel};
pub use info::{parse_info, CommandStat, InfoResponse, KeyspaceStat};
pub use info_fields::{
    default_info_fields, AggregationType, DiffType, DisplayFormat, InfoFieldType, NodeFilter,
    ParseStrategy,
};
pub use reporter::Reporter;
pub use sampler::{sample_keyspace, KeyspaceSample, SampleConfig, TypeStats};
pub use snapshot::{collect_node, collect_round, ClusterSnapshot, NodeSnapshot};
