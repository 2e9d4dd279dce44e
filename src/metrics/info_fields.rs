//! Configurable INFO field definitions for delta tracking
//!
//! Each tracked field has:
//! - A parsing strategy (integer, memory, fixed-point float)
//! - An aggregation type across nodes (sum, average, max)
//! - A display format
//! - A diff type for rate calculation between snapshots
//! - A node filter (primary only, replica only, all)

use serde::Serialize;

use super::info::InfoResponse;
use crate::cluster::NodeRole;

/// Parse strategy for extracting values from INFO responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseStrategy {
    /// Parse as unsigned integer
    Integer,
    /// Parse memory with K/M/G suffixes
    Memory,
    /// Parse float, store as fixed-point (value * 1000)
    FloatFixed,
}

/// How to aggregate values across nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggregationType {
    Sum,
    Average,
    Max,
}

/// How to display the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisplayFormat {
    /// Plain integer
    Integer,
    /// Human-readable memory (auto-scale K/M/G)
    MemoryHuman,
    /// Float (from fixed-point scaled by 1000)
    Float,
}

/// How to turn a counter delta into a rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiffType {
    /// Gauge, no delta
    None,
    /// Events per second
    RateCount,
    /// KB per second
    RateBytes,
    /// CPU seconds per second, from a fixed-point counter
    RateCpu,
}

/// Which nodes to aggregate from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NodeFilter {
    PrimaryOnly,
    ReplicaOnly,
    All,
}

impl NodeFilter {
    pub fn includes(&self, role: NodeRole) -> bool {
        match self {
            NodeFilter::PrimaryOnly => role.is_primary(),
            NodeFilter::ReplicaOnly => !role.is_primary(),
            NodeFilter::All => true,
        }
    }
}

/// Definition of a field to track
#[derive(Debug, Clone, Serialize)]
pub struct InfoFieldType {
    /// INFO key
    pub name: String,
    pub parse_strategy: ParseStrategy,
    pub aggregation_type: AggregationType,
    pub display_format: DisplayFormat,
    pub diff_type: DiffType,
    pub node_filter: NodeFilter,
}

impl InfoFieldType {
    /// Create a new field definition with common defaults
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parse_strategy: ParseStrategy::Integer,
            aggregation_type: AggregationType::Sum,
            display_format: DisplayFormat::Integer,
            diff_type: DiffType::None,
            node_filter: NodeFilter::All,
        }
    }

    // Builder methods
    pub fn parse(mut self, strategy: ParseStrategy) -> Self {
        self.parse_strategy = strategy;
        self
    }

    pub fn aggregate(mut self, agg: AggregationType) -> Self {
        self.aggregation_type = agg;
        self
    }

    pub fn display(mut self, fmt: DisplayFormat) -> Self {
        self.display_format = fmt;
        self
    }

    pub fn diff(mut self, diff: DiffType) -> Self {
        self.diff_type = diff;
        self
    }

    pub fn from_primary_only(mut self) -> Self {
        self.node_filter = NodeFilter::PrimaryOnly;
        self
    }

    pub fn from_replica_only(mut self) -> Self {
        self.node_filter = NodeFilter::ReplicaOnly;
        self
    }

    /// Monotonic counter, as opposed to a gauge
    pub fn is_counter(&self) -> bool {
        self.diff_type != DiffType::None
    }

    /// Read and parse this field from an INFO response
    pub fn read(&self, info: &InfoResponse) -> Option<u64> {
        parse_value(info.get(&self.name)?, self.parse_strategy)
    }
}

/// Parse a raw INFO value according to the strategy
pub fn parse_value(raw: &str, strategy: ParseStrategy) -> Option<u64> {
    let raw = raw.trim();
    match strategy {
        ParseStrategy::Integer => raw.parse::<u64>().ok(),
        ParseStrategy::Memory => parse_memory_value(raw),
        ParseStrategy::FloatFixed => {
            let f: f64 = raw.parse().ok()?;
            if f.is_finite() && f >= 0.0 {
                Some((f * 1000.0).round() as u64)
            } else {
                None
            }
        }
    }
}

/// Parse memory value with K/M/G/T suffixes
pub fn parse_memory_value(s: &str) -> Option<u64> {
    let s = s.trim();
    let last = s.chars().last()?;

    let (num_str, multiplier) = match last.to_ascii_uppercase() {
        'K' => (&s[..s.len() - 1], 1024u64),
        'M' => (&s[..s.len() - 1], 1024 * 1024),
        'G' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        'T' => (&s[..s.len() - 1], 1024 * 1024 * 1024 * 1024),
        _ => (s, 1),
    };

    if let Ok(v) = num_str.parse::<u64>() {
        return v.checked_mul(multiplier);
    }
    // Decimal values like "1.50M"
    let f: f64 = num_str.parse().ok()?;
    if f.is_finite() && f >= 0.0 {
        Some((f * multiplier as f64) as u64)
    } else {
        None
    }
}

/// Format a value for display
pub fn format_value(value: f64, format: DisplayFormat) -> String {
    match format {
        DisplayFormat::Integer => format!("{:.0}", value),
        DisplayFormat::MemoryHuman => format_memory_human(value),
        DisplayFormat::Float => format!("{:.3}", value / 1000.0),
    }
}

/// Format bytes as human-readable string
pub fn format_memory_human(bytes: f64) -> String {
    const K: f64 = 1024.0;
    let sign = if bytes < 0.0 { "-" } else { "" };
    let abs = bytes.abs();

    if abs >= K * K * K * K {
        format!("{}{:.2}T", sign, abs / (K * K * K * K))
    } else if abs >= K * K * K {
        format!("{}{:.2}G", sign, abs / (K * K * K))
    } else if abs >= K * K {
        format!("{}{:.2}M", sign, abs / (K * K))
    } else if abs >= K {
        format!("{}{:.2}K", sign, abs / K)
    } else {
        format!("{}{:.0}B", sign, abs)
    }
}

/// Rate for a counter delta over `elapsed_secs`
pub fn calculate_rate(delta: u64, elapsed_secs: f64, diff_type: DiffType) -> Option<f64> {
    if elapsed_secs <= 0.0 {
        return None;
    }
    let delta = delta as f64;
    match diff_type {
        DiffType::None => None,
        DiffType::RateCount => Some(delta / elapsed_secs),
        DiffType::RateBytes => Some(delta / 1024.0 / elapsed_secs),
        DiffType::RateCpu => Some(delta / 1000.0 / elapsed_secs),
    }
}

/// Format a rate with the unit of its diff type
pub fn format_rate(rate: f64, diff_type: DiffType) -> String {
    match diff_type {
        DiffType::None => String::new(),
        DiffType::RateCount => format!("{:.1}/s", rate),
        DiffType::RateBytes => format!("{:.1} KB/s", rate),
        DiffType::RateCpu => format!("{:.1}% cpu", rate * 100.0),
    }
}

/// Aggregate per-node values
pub fn aggregate(values: &[f64], aggregation: AggregationType) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(match aggregation {
        AggregationType::Sum => values.iter().sum(),
        AggregationType::Average => values.iter().sum::<f64>() / values.len() as f64,
        AggregationType::Max => values.iter().cloned().fold(f64::MIN, f64::max),
    })
}

/// Default tracked fields
pub fn default_info_fields() -> Vec<InfoFieldType> {
    vec![
        // Client traffic
        InfoFieldType::new("total_net_input_bytes")
            .display(DisplayFormat::MemoryHuman)
            .diff(DiffType::RateBytes),
        InfoFieldType::new("total_net_output_bytes")
            .display(DisplayFormat::MemoryHuman)
            .diff(DiffType::RateBytes),
        // Replication traffic
        InfoFieldType::new("total_net_repl_input_bytes")
            .display(DisplayFormat::MemoryHuman)
            .diff(DiffType::RateBytes)
            .from_replica_only(),
        InfoFieldType::new("total_net_repl_output_bytes")
            .display(DisplayFormat::MemoryHuman)
            .diff(DiffType::RateBytes)
            .from_primary_only(),
        // Throughput
        InfoFieldType::new("total_commands_processed").diff(DiffType::RateCount),
        InfoFieldType::new("keyspace_hits").diff(DiffType::RateCount),
        InfoFieldType::new("keyspace_misses").diff(DiffType::RateCount),
        InfoFieldType::new("expired_keys")
            .diff(DiffType::RateCount)
            .from_primary_only(),
        InfoFieldType::new("evicted_keys")
            .diff(DiffType::RateCount)
            .from_primary_only(),
        // Connections
        InfoFieldType::new("total_connections_received").diff(DiffType::RateCount),
        InfoFieldType::new("rejected_connections").diff(DiffType::RateCount),
        InfoFieldType::new("connected_clients"),
        // CPU
        InfoFieldType::new("used_cpu_sys")
            .parse(ParseStrategy::FloatFixed)
            .display(DisplayFormat::Float)
            .diff(DiffType::RateCpu),
        InfoFieldType::new("used_cpu_user")
            .parse(ParseStrategy::FloatFixed)
            .display(DisplayFormat::Float)
            .diff(DiffType::RateCpu),
        // Memory
        InfoFieldType::new("used_memory")
            .parse(ParseStrategy::Memory)
            .display(DisplayFormat::MemoryHuman),
        InfoFieldType::new("mem_fragmentation_ratio")
            .parse(ParseStrategy::FloatFixed)
            .aggregate(AggregationType::Max)
            .display(DisplayFormat::Float),
    ]
}
