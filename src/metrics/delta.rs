//! Counter deltas between a baseline and a final snapshot
//!
//! Only keys present in both snapshots produce a delta. Counters that went
//! backwards are either wrapped (small wrapping distance) or reset
//! (excluded). A node whose `run_id` changed or whose uptime went down
//! restarted in between and contributes no counters at all.

use std::collections::BTreeMap;

use serde::Serialize;

use super::ecpu::{classify_command, CommandCategory, CommandUsage, EcpuEstimate, EcpuModel};
use super::info::CommandStat;
use super::info_fields::{aggregate, calculate_rate, DiffType, DisplayFormat, InfoFieldType};
use super::snapshot::NodeSnapshot;
use crate::cluster::NodeRole;

/// Result of comparing two readings of a monotonic counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterDelta {
    /// `new >= old`
    Advanced(u64),
    /// Counter passed u64::MAX and started over
    Wrapped(u64),
    /// Counter went back to a lower value; not comparable
    Reset,
}

impl CounterDelta {
    pub fn value(&self) -> Option<u64> {
        match self {
            CounterDelta::Advanced(n) | CounterDelta::Wrapped(n) => Some(*n),
            CounterDelta::Reset => None,
        }
    }
}

/// Compare two counter readings
pub fn counter_delta(old: u64, new: u64) -> CounterDelta {
    if new >= old {
        return CounterDelta::Advanced(new - old);
    }
    let distance = new.wrapping_sub(old);
    if distance < u64::MAX / 2 {
        CounterDelta::Wrapped(distance)
    } else {
        CounterDelta::Reset
    }
}

/// Change of one tracked INFO field on one node
#[derive(Debug, Clone, Serialize)]
pub struct FieldDelta {
    pub name: String,
    pub baseline: Option<u64>,
    pub final_value: Option<u64>,
    /// Counter delta; `None` for gauges and excluded counters
    pub delta: Option<u64>,
    pub wrapped: bool,
    /// Rate in the unit of the field's diff type
    pub rate: Option<f64>,
}

/// Change of one command's stats on one node
#[derive(Debug, Clone, Serialize)]
pub struct CommandDelta {
    pub command: String,
    pub category: CommandCategory,
    pub calls: u64,
    pub usec: u64,
    /// Average over the interval
    pub usec_per_call: f64,
    pub rejected_calls: u64,
    pub failed_calls: u64,
    pub calls_per_sec: f64,
}

/// Everything measured on one node between the two rounds
#[derive(Debug, Clone, Serialize)]
pub struct NodeDelta {
    pub address: String,
    pub display_name: String,
    pub role: NodeRole,
    pub elapsed_secs: f64,
    pub restarted: bool,
    pub fields: Vec<FieldDelta>,
    /// Sorted by calls, highest first
    pub commands: Vec<CommandDelta>,
    /// Commands that only appear in the final snapshot
    pub first_seen_commands: Vec<String>,
    /// Counters excluded because they went backwards
    pub reset_counters: Vec<String>,
    pub net_input_bytes: u64,
    pub net_output_bytes: u64,
    pub input_kbps: f64,
    pub output_kbps: f64,
    pub ops_per_sec: f64,
    pub hit_ratio: Option<f64>,
    pub ecpu: EcpuEstimate,
}

impl NodeDelta {
    pub fn field(&self, name: &str) -> Option<&FieldDelta> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn field_delta(&self, name: &str) -> Option<u64> {
        self.field(name).and_then(|f| f.delta)
    }
}

fn restarted(baseline: &NodeSnapshot, last: &NodeSnapshot) -> bool {
    let run_id_changed = match (baseline.info.run_id(), last.info.run_id()) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    };
    let uptime_went_back = match (baseline.info.uptime_secs(), last.info.uptime_secs()) {
        (Some(a), Some(b)) => b < a,
        _ => false,
    };
    run_id_changed || uptime_went_back
}

fn command_delta(
    name: &str,
    old: &CommandStat,
    new: &CommandStat,
    elapsed_secs: f64,
) -> Option<CommandDelta> {
    let calls = counter_delta(old.calls, new.calls).value()?;
    let usec = counter_delta(old.usec, new.usec).value()?;
    let usec_per_call = if calls > 0 {
        usec as f64 / calls as f64
    } else {
        new.usec_per_call
    };
    Some(CommandDelta {
        command: name.to_string(),
        category: classify_command(name),
        calls,
        usec,
        usec_per_call,
        rejected_calls: counter_delta(old.rejected_calls, new.rejected_calls)
            .value()
            .unwrap_or(0),
        failed_calls: counter_delta(old.failed_calls, new.failed_calls)
            .value()
            .unwrap_or(0),
        calls_per_sec: if elapsed_secs > 0.0 {
            calls as f64 / elapsed_secs
        } else {
            0.0
        },
    })
}

/// Compute the delta of one node between two snapshots
pub fn compute_node_delta(
    baseline: &NodeSnapshot,
    last: &NodeSnapshot,
    fields: &[InfoFieldType],
    model: &EcpuModel,
) -> NodeDelta {
    let elapsed_secs = last
        .captured_at
        .saturating_duration_since(baseline.captured_at)
        .as_secs_f64();
    let restarted = restarted(baseline, last);
    let role = last.role;

    let mut reset_counters = Vec::new();
    let mut field_deltas = Vec::new();
    for field in fields.iter().filter(|f| f.node_filter.includes(role)) {
        let old = field.read(&baseline.info);
        let new = field.read(&last.info);
        let (delta, wrapped) = match (field.is_counter() && !restarted, old, new) {
            (true, Some(o), Some(n)) => match counter_delta(o, n) {
                CounterDelta::Advanced(d) => (Some(d), false),
                CounterDelta::Wrapped(d) => (Some(d), true),
                CounterDelta::Reset => {
                    reset_counters.push(field.name.clone());
                    (None, false)
                }
            },
            _ => (None, false),
        };
        if old.is_none() && new.is_none() {
            continue;
        }
        field_deltas.push(FieldDelta {
            name: field.name.clone(),
            baseline: old,
            final_value: new,
            delta,
            wrapped,
            rate: delta.and_then(|d| calculate_rate(d, elapsed_secs, field.diff_type)),
        });
    }

    let old_stats = baseline.info.command_stats();
    let new_stats = last.info.command_stats();
    let mut commands = Vec::new();
    let mut first_seen_commands = Vec::new();
    for (name, new_stat) in &new_stats {
        match old_stats.get(name) {
            None => first_seen_commands.push(name.clone()),
            Some(_) if restarted => {}
            Some(old_stat) => match command_delta(name, old_stat, new_stat, elapsed_secs) {
                Some(delta) => commands.push(delta),
                None => reset_counters.push(format!("cmdstat_{}", name)),
            },
        }
    }
    commands.retain(|c| c.calls > 0);
    commands.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.command.cmp(&b.command)));

    let mut delta = NodeDelta {
        address: last.address.clone(),
        display_name: last.display_name.clone(),
        role,
        elapsed_secs,
        restarted,
        fields: field_deltas,
        commands,
        first_seen_commands,
        reset_counters,
        net_input_bytes: 0,
        net_output_bytes: 0,
        input_kbps: 0.0,
        output_kbps: 0.0,
        ops_per_sec: 0.0,
        hit_ratio: None,
        ecpu: EcpuEstimate::default(),
    };

    delta.net_input_bytes = delta.field_delta("total_net_input_bytes").unwrap_or(0);
    delta.net_output_bytes = delta.field_delta("total_net_output_bytes").unwrap_or(0);
    if elapsed_secs > 0.0 {
        delta.input_kbps = delta.net_input_bytes as f64 / 1024.0 / elapsed_secs;
        delta.output_kbps = delta.net_output_bytes as f64 / 1024.0 / elapsed_secs;
        delta.ops_per_sec =
            delta.field_delta("total_commands_processed").unwrap_or(0) as f64 / elapsed_secs;
    }
    delta.hit_ratio = match (
        delta.field_delta("keyspace_hits"),
        delta.field_delta("keyspace_misses"),
    ) {
        (Some(h), Some(m)) if h.saturating_add(m) > 0 => {
            Some(h as f64 / h.saturating_add(m) as f64)
        }
        _ => None,
    };

    if !restarted {
        let usage: Vec<CommandUsage> = delta
            .commands
            .iter()
            .map(|c| CommandUsage {
                category: c.category,
                calls: c.calls,
                usec_per_call: c.usec_per_call,
            })
            .collect();
        delta.ecpu = model.estimate(
            &usage,
            delta.net_input_bytes,
            delta.net_output_bytes,
            role,
            elapsed_secs,
        );
    }

    delta
}

/// Cluster-wide sums over node deltas
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterTotals {
    pub nodes_measured: usize,
    pub nodes_restarted: usize,
    pub net_input_bytes: u64,
    pub net_output_bytes: u64,
    pub input_kbps: f64,
    pub output_kbps: f64,
    pub ops_per_sec: f64,
    pub ecpu: EcpuEstimate,
}

impl ClusterTotals {
    pub fn from_deltas(deltas: &[NodeDelta]) -> Self {
        let mut totals = ClusterTotals::default();
        for d in deltas {
            totals.nodes_measured += 1;
            if d.restarted {
                totals.nodes_restarted += 1;
                continue;
            }
            totals.net_input_bytes = totals.net_input_bytes.saturating_add(d.net_input_bytes);
            totals.net_output_bytes = totals.net_output_bytes.saturating_add(d.net_output_bytes);
            totals.input_kbps += d.input_kbps;
            totals.output_kbps += d.output_kbps;
            totals.ops_per_sec += d.ops_per_sec;
            totals.ecpu += &d.ecpu;
        }
        totals
    }
}

/// One command summed over nodes
#[derive(Debug, Clone, Serialize)]
pub struct CommandTotal {
    pub command: String,
    pub category: CommandCategory,
    pub calls: u64,
    pub usec: u64,
    pub usec_per_call: f64,
    pub calls_per_sec: f64,
    pub failed_calls: u64,
    pub nodes: usize,
}

/// Top `limit` commands by calls across all nodes
pub fn top_commands(deltas: &[NodeDelta], limit: usize) -> Vec<CommandTotal> {
    let mut by_name: BTreeMap<&str, CommandTotal> = BTreeMap::new();
    for cmd in deltas.iter().flat_map(|d| d.commands.iter()) {
        let total = by_name.entry(cmd.command.as_str()).or_insert_with(|| CommandTotal {
            command: cmd.command.clone(),
            category: cmd.category,
            calls: 0,
            usec: 0,
            usec_per_call: 0.0,
            calls_per_sec: 0.0,
            failed_calls: 0,
            nodes: 0,
        });
        total.calls = total.calls.saturating_add(cmd.calls);
        total.usec = total.usec.saturating_add(cmd.usec);
        total.calls_per_sec += cmd.calls_per_sec;
        total.failed_calls = total.failed_calls.saturating_add(cmd.failed_calls);
        total.nodes += 1;
    }

    let mut totals: Vec<CommandTotal> = by_name
        .into_values()
        .map(|mut t| {
            t.usec_per_call = if t.calls > 0 {
                t.usec as f64 / t.calls as f64
            } else {
                0.0
            };
            t
        })
        .collect();
    totals.sort_by(|a, b| b.calls.cmp(&a.calls).then_with(|| a.command.cmp(&b.command)));
    totals.truncate(limit);
    totals
}

/// One tracked field aggregated over nodes
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedField {
    pub name: String,
    pub diff_type: DiffType,
    pub display_format: DisplayFormat,
    /// Nodes contributing a value
    pub nodes: usize,
    /// Counters: summed delta
    pub total_delta: Option<u64>,
    /// Counters: summed per-node rate
    pub rate: Option<f64>,
    /// Gauges: aggregated final value
    pub value: Option<f64>,
}

/// Aggregate every tracked field over the node deltas
pub fn aggregate_fields(deltas: &[NodeDelta], fields: &[InfoFieldType]) -> Vec<AggregatedField> {
    fields
        .iter()
        .filter_map(|field| {
            let per_node: Vec<&FieldDelta> =
                deltas.iter().filter_map(|d| d.field(&field.name)).collect();

            let aggregated = if field.is_counter() {
                let counted: Vec<&FieldDelta> =
                    per_node.iter().copied().filter(|f| f.delta.is_some()).collect();
                if counted.is_empty() {
                    return None;
                }
                AggregatedField {
                    name: field.name.clone(),
                    diff_type: field.diff_type,
                    display_format: field.display_format,
                    nodes: counted.len(),
                    total_delta: Some(
                        counted
                            .iter()
                            .filter_map(|f| f.delta)
                            .fold(0u64, u64::saturating_add),
                    ),
                    rate: Some(counted.iter().filter_map(|f| f.rate).sum()),
                    value: None,
                }
            } else {
                let values: Vec<f64> = per_node
                    .iter()
                    .filter_map(|f| f.final_value)
                    .map(|v| v as f64)
                    .collect();
                AggregatedField {
                    name: field.name.clone(),
                    diff_type: field.diff_type,
                    display_format: field.display_format,
                    nodes: values.len(),
                    total_delta: None,
                    rate: None,
                    value: Some(aggregate(&values, field.aggregation_type)?),
                }
            };
            Some(aggregated)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterNode;
    use crate::metrics::info::parse_info;
    use crate::metrics::info_fields::default_info_fields;
    use std::time::{Duration, Instant};

    fn snapshot(role: NodeRole, text: &str, at: Instant) -> NodeSnapshot {
        let node = ClusterNode::standalone("10.0.0.1", 6379, role);
        let mut snap = NodeSnapshot::new(&node, parse_info(text));
        snap.captured_at = at;
        snap
    }

    fn pair(old: &str, new: &str, role: NodeRole) -> NodeDelta {
        let t0 = Instant::now();
        let base = snapshot(role, old, t0);
        let last = snapshot(role, new, t0 + Duration::from_secs(10));
        compute_node_delta(&base, &last, &default_info_fields(), &EcpuModel::default())
    }

    #[test]
    fn test_counter_delta_rules() {
        assert_eq!(counter_delta(10, 15), CounterDelta::Advanced(5));
        assert_eq!(counter_delta(7, 7), CounterDelta::Advanced(0));
        assert_eq!(counter_delta(u64::MAX - 2, 3), CounterDelta::Wrapped(6));
        assert_eq!(counter_delta(1_000_000, 10), CounterDelta::Reset);
        assert_eq!(CounterDelta::Reset.value(), None);
    }

    #[test]
    fn test_basic_node_delta() {
        let old = "run_id:a\r\nuptime_in_seconds:100\r\ntotal_commands_processed:1000\r\n\
total_net_input_bytes:10240\r\ntotal_net_output_bytes:0\r\nkeyspace_hits:10\r\nkeyspace_misses:10\r\n\
# Commandstats\r\ncmdstat_get:calls=100,usec=200,usec_per_call=2.00\r\n\
cmdstat_set:calls=50,usec=100,usec_per_call=2.00\r\n";
        let new = "run_id:a\r\nuptime_in_seconds:110\r\ntotal_commands_processed:2000\r\n\
total_net_input_bytes:112640\r\ntotal_net_output_bytes:20480\r\nkeyspace_hits:40\r\nkeyspace_misses:20\r\n\
# Commandstats\r\ncmdstat_get:calls=600,usec=1200,usec_per_call=2.00\r\n\
cmdstat_set:calls=150,usec=300,usec_per_call=2.00\r\n\
cmdstat_hgetall:calls=5,usec=50,usec_per_call=10.00\r\n";
        let delta = pair(old, new, NodeRole::Primary);

        assert!(!delta.restarted);
        assert_eq!(delta.elapsed_secs, 10.0);
        assert_eq!(delta.ops_per_sec, 100.0);
        assert_eq!(delta.net_input_bytes, 102400);
        assert_eq!(delta.input_kbps, 10.0);
        assert_eq!(delta.hit_ratio, Some(0.75));
        assert_eq!(delta.commands.len(), 2);
        assert_eq!(delta.commands[0].command, "get");
        assert_eq!(delta.commands[0].calls, 500);
        assert_eq!(delta.first_seen_commands, vec!["hgetall"]);
        // 500 reads vs 20 KB out; 100 writes vs 100 KB in
        assert_eq!(delta.ecpu.read_ecpu, 500.0);
        assert_eq!(delta.ecpu.write_ecpu, 100.0);
    }

    #[test]
    fn test_reset_command_excluded() {
        let old = "run_id:a\r\n# Commandstats\r\ncmdstat_get:calls=1000,usec=2000,usec_per_call=2.00\r\n\
cmdstat_set:calls=10,usec=20,usec_per_call=2.00\r\n";
        let new = "run_id:a\r\n# Commandstats\r\ncmdstat_get:calls=5,usec=10,usec_per_call=2.00\r\n\
cmdstat_set:calls=30,usec=60,usec_per_call=2.00\r\n";
        let delta = pair(old, new, NodeRole::Primary);

        assert_eq!(delta.commands.len(), 1);
        assert_eq!(delta.commands[0].command, "set");
        assert_eq!(delta.reset_counters, vec!["cmdstat_get"]);
    }

    #[test]
    fn test_restart_excludes_everything() {
        let old = "run_id:a\r\nuptime_in_seconds:1000\r\ntotal_commands_processed:100\r\n\
# Commandstats\r\ncmdstat_get:calls=100,usec=200,usec_per_call=2.00\r\n";
        let new = "run_id:b\r\nuptime_in_seconds:5\r\ntotal_commands_processed:500\r\n\
# Commandstats\r\ncmdstat_get:calls=300,usec=600,usec_per_call=2.00\r\n";
        let delta = pair(old, new, NodeRole::Primary);

        assert!(delta.restarted);
        assert!(delta.commands.is_empty());
        assert!(delta.fields.iter().all(|f| f.delta.is_none()));
        assert_eq!(delta.ecpu.total_ecpu, 0.0);

        let totals = ClusterTotals::from_deltas(&[delta]);
        assert_eq!(totals.nodes_restarted, 1);
        assert_eq!(totals.ops_per_sec, 0.0);
    }

    #[test]
    fn test_uptime_decrease_alone_is_restart() {
        let delta = pair(
            "uptime_in_seconds:500\r\n",
            "uptime_in_seconds:3\r\n",
            NodeRole::Primary,
        );
        assert!(delta.restarted);
    }

    #[test]
    fn test_wrapped_counters_reach_totals() {
        let old = format!(
            "run_id:a\r\ntotal_net_input_bytes:{}\r\n\
# Commandstats\r\ncmdstat_get:calls={},usec={},usec_per_call=2.00\r\n",
            u64::MAX - 1023,
            u64::MAX - 99,
            u64::MAX - 199
        );
        let new = "run_id:a\r\ntotal_net_input_bytes:1024\r\n\
# Commandstats\r\ncmdstat_get:calls=100,usec=200,usec_per_call=2.00\r\n";
        let delta = pair(&old, new, NodeRole::Primary);

        let net_in = delta.field("total_net_input_bytes").unwrap();
        assert!(net_in.wrapped);
        assert_eq!(net_in.delta, Some(2048));
        assert_eq!(delta.net_input_bytes, 2048);
        assert!(delta.reset_counters.is_empty());
        assert_eq!(delta.commands[0].command, "get");
        assert_eq!(delta.commands[0].calls, 200);
        assert_eq!(delta.commands[0].usec, 400);

        let deltas = vec![delta];
        let totals = ClusterTotals::from_deltas(&deltas);
        assert_eq!(totals.net_input_bytes, 2048);
        let top = top_commands(&deltas, 5);
        assert_eq!(top[0].calls, 200);
    }

    #[test]
    fn test_hit_ratio_with_huge_deltas() {
        let delta = pair(
            "run_id:a\r\nkeyspace_hits:0\r\nkeyspace_misses:0\r\n",
            &format!(
                "run_id:a\r\nkeyspace_hits:{}\r\nkeyspace_misses:10\r\n",
                u64::MAX
            ),
            NodeRole::Primary,
        );
        assert_eq!(delta.hit_ratio, Some(1.0));
    }

    #[test]
    fn test_field_only_in_final_has_no_delta() {
        let delta = pair(
            "run_id:a\r\n",
            "run_id:a\r\nevicted_keys:10\r\n",
            NodeRole::Primary,
        );
        let evicted = delta.field("evicted_keys").unwrap();
        assert_eq!(evicted.baseline, None);
        assert_eq!(evicted.delta, None);
    }

    #[test]
    fn test_totals_and_top_commands() {
        let old = "run_id:a\r\ntotal_commands_processed:0\r\n\
# Commandstats\r\ncmdstat_get:calls=0,usec=0,usec_per_call=0.00\r\ncmdstat_set:calls=0,usec=0,usec_per_call=0.00\r\n";
        let new = "run_id:a\r\ntotal_commands_processed:300\r\n\
# Commandstats\r\ncmdstat_get:calls=200,usec=400,usec_per_call=2.00\r\ncmdstat_set:calls=100,usec=100,usec_per_call=1.00\r\n";
        let deltas = vec![
            pair(old, new, NodeRole::Primary),
            pair(old, new, NodeRole::Replica),
        ];

        let totals = ClusterTotals::from_deltas(&deltas);
        assert_eq!(totals.nodes_measured, 2);
        assert_eq!(totals.ops_per_sec, 60.0);

        let top = top_commands(&deltas, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].command, "get");
        assert_eq!(top[0].calls, 400);
        assert_eq!(top[0].nodes, 2);
        assert_eq!(top[0].usec_per_call, 2.0);

        let aggregated = aggregate_fields(&deltas, &default_info_fields());
        let processed = aggregated
            .iter()
            .find(|f| f.name == "total_commands_processed")
            .unwrap();
        assert_eq!(processed.total_delta, Some(600));
        assert_eq!(processed.nodes, 2);
    }
}
