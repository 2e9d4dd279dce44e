//! Report output formatting and export
//!
//! Supports multiple output formats:
//! - Text (console tables)
//! - JSON
//! - CSV (per-node rows, plus an optional per-command file)

use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tabled::builder::Builder;
use tabled::settings::object::Columns;
use tabled::settings::{Alignment, Modify, Style};

use super::info_fields::{format_memory_human, format_rate, format_value, DiffType};
use crate::assess::AssessmentReport;
use crate::config::OutputFormat;
use crate::utils::Result;

/// Report writer
pub struct Reporter {
    format: OutputFormat,
}

impl Reporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render the report in the configured format
    pub fn render(&self, report: &AssessmentReport) -> Result<String> {
        Ok(match self.format {
            OutputFormat::Text => render_text(report),
            OutputFormat::Json => render_json(report)?,
            OutputFormat::Csv => render_csv(report),
        })
    }

    /// Write to `path`, or stdout when no path is given
    pub fn write(&self, report: &AssessmentReport, path: Option<&Path>) -> Result<()> {
        let rendered = self.render(report)?;
        match path {
            Some(path) => {
                let mut file = File::create(path)?;
                file.write_all(rendered.as_bytes())?;
            }
            None => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                out.write_all(rendered.as_bytes())?;
                out.flush()?;
            }
        }
        Ok(())
    }

    /// Write the per-command CSV file
    pub fn write_commands_csv(&self, report: &AssessmentReport, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(render_commands_csv(report).as_bytes())?;
        Ok(())
    }
}

/// Compact number notation
fn format_compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("{:.1}G", value / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if abs >= 10_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else if abs >= 100.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.2}", value)
    }
}

fn table(builder: Builder) -> String {
    let mut table = builder.build();
    table.with(Style::sharp());
    table.with(Modify::new(Columns::new(1..)).with(Alignment::right()));
    table.with(Modify::new(Columns::first()).with(Alignment::left()));
    table.to_string()
}

/// Console report
pub fn render_text(report: &AssessmentReport) -> String {
    let mut out = String::new();
    let meta = &report.metadata;

    let _ = writeln!(out, "\n=== Valkey Assessment ===");
    let _ = writeln!(out, "Seeds: {}", meta.seeds.join(", "));
    let _ = writeln!(
        out,
        "Mode: {:?} | Primaries: {} | Replicas: {} | Interval: {:.2}s",
        report.topology.mode, report.topology.primaries, report.topology.replicas, meta.measured_secs
    );
    if report.is_partial() {
        let _ = writeln!(out, "Partial result: {} node failure(s)", report.failures.len());
    }

    // Topology
    let mut builder = Builder::default();
    builder.push_record(["Node", "Address", "Role", "Slots", "Available"]);
    for node in &report.topology.nodes {
        builder.push_record([
            node.display_name.clone(),
            node.address.clone(),
            node.role.to_string(),
            node.slots.to_string(),
            if node.available { "yes" } else { "no" }.to_string(),
        ]);
    }
    let _ = writeln!(out, "\n[Topology]\n{}", table(builder));

    // Per node
    if !report.nodes.is_empty() {
        let mut builder = Builder::default();
        builder.push_record([
            "Node", "Role", "Ops/s", "In KB/s", "Out KB/s", "Hit %", "ECPU/s", "Notes",
        ]);
        for d in &report.nodes {
            let mut notes = Vec::new();
            if d.restarted {
                notes.push("restarted".to_string());
            }
            if !d.reset_counters.is_empty() {
                notes.push(format!("{} reset", d.reset_counters.len()));
            }
            if !d.first_seen_commands.is_empty() {
                notes.push(format!("{} new cmds", d.first_seen_commands.len()));
            }
            builder.push_record([
                d.display_name.clone(),
                d.role.to_string(),
                format_compact(d.ops_per_sec),
                format_compact(d.input_kbps),
                format_compact(d.output_kbps),
                d.hit_ratio
                    .map(|r| format!("{:.1}", r * 100.0))
                    .unwrap_or_else(|| "-".to_string()),
                format_compact(d.ecpu.ecpu_per_sec),
                notes.join(", "),
            ]);
        }
        let t = &report.totals;
        builder.push_record([
            "TOTAL".to_string(),
            format!("{} nodes", t.nodes_measured),
            format_compact(t.ops_per_sec),
            format_compact(t.input_kbps),
            format_compact(t.output_kbps),
            String::new(),
            format_compact(t.ecpu.ecpu_per_sec),
            if t.nodes_restarted > 0 {
                format!("{} restarted", t.nodes_restarted)
            } else {
                String::new()
            },
        ]);
        let _ = writeln!(out, "\n[Nodes]\n{}", table(builder));

        let e = &t.ecpu;
        let _ = writeln!(
            out,
            "ECPU estimate: {:.0} total ({:.0} read, {:.0} write, {:.0} other), {:.1}/s",
            e.total_ecpu, e.read_ecpu, e.write_ecpu, e.other_ecpu, e.ecpu_per_sec
        );
        let _ = writeln!(
            out,
            "Traffic: {} in, {} out",
            format_memory_human(t.net_input_bytes as f64),
            format_memory_human(t.net_output_bytes as f64)
        );
    }

    // Aggregated fields
    if !report.fields.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Nodes", "Delta / Value", "Rate"]);
        for f in &report.fields {
            let (value, rate) = match f.diff_type {
                DiffType::None => (
                    f.value.map(|v| format_value(v, f.display_format)).unwrap_or_default(),
                    String::new(),
                ),
                diff_type => (
                    f.total_delta
                        .map(|d| format_value(d as f64, f.display_format))
                        .unwrap_or_default(),
                    f.rate.map(|r| format_rate(r, diff_type)).unwrap_or_default(),
                ),
            };
            builder.push_record([f.name.clone(), f.nodes.to_string(), value, rate]);
        }
        let _ = writeln!(out, "\n[Fields]\n{}", table(builder));
    }

    // Commands
    if !report.top_commands.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Command", "Type", "Calls", "Calls/s", "usec/call", "Failed"]);
        for c in &report.top_commands {
            builder.push_record([
                c.command.clone(),
                format!("{:?}", c.category).to_lowercase(),
                c.calls.to_string(),
                format_compact(c.calls_per_sec),
                format!("{:.2}", c.usec_per_call),
                c.failed_calls.to_string(),
            ]);
        }
        let _ = writeln!(out, "\n[Top commands]\n{}", table(builder));
    }

    // Keyspace samples
    for sample in &report.keyspace_samples {
        let mut builder = Builder::default();
        builder.push_record(["Type", "Keys", "Avg", "Min", "Max"]);
        for (key_type, stats) in &sample.by_type {
            builder.push_record([
                key_type.clone(),
                stats.keys.to_string(),
                stats.avg_bytes().map(format_memory_human).unwrap_or_else(|| "-".to_string()),
                stats
                    .min_bytes
                    .map(|b| format_memory_human(b as f64))
                    .unwrap_or_else(|| "-".to_string()),
                stats
                    .max_bytes
                    .map(|b| format_memory_human(b as f64))
                    .unwrap_or_else(|| "-".to_string()),
            ]);
        }
        let _ = writeln!(
            out,
            "\n[Keyspace sample {}: {} keys{}]\n{}",
            sample.address,
            sample.keys_sampled,
            if sample.complete { ", full scan" } else { "" },
            table(builder)
        );
    }

    let changes = report.topology_changes.describe();
    if !changes.is_empty() {
        let _ = writeln!(out, "\n[Topology changes]");
        for line in changes {
            let _ = writeln!(out, "  {}", line);
        }
    }
    if !report.first_seen_nodes.is_empty() {
        let _ = writeln!(
            out,
            "\nNodes first seen in the final round (not in totals): {}",
            report.first_seen_nodes.join(", ")
        );
    }

    if !report.failures.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Round", "Node", "Role", "Kind", "Reason"]);
        for f in &report.failures {
            builder.push_record([
                f.round.clone(),
                f.failure.address.clone(),
                f.failure.role.to_string(),
                format!("{:?}", f.failure.kind).to_lowercase(),
                f.failure.reason.clone(),
            ]);
        }
        let _ = writeln!(out, "\n[Failures]\n{}", table(builder));
    }

    out
}

/// Pretty JSON report
pub fn render_json(report: &AssessmentReport) -> Result<String> {
    serde_json::to_string_pretty(report)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
}

/// Quote a CSV field when needed
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub const NODE_CSV_HEADER: &str = "node,address,role,elapsed_secs,restarted,ops_per_sec,\
net_input_bytes,net_output_bytes,input_kbps,output_kbps,hit_ratio,read_ecpu,write_ecpu,\
other_ecpu,total_ecpu,ecpu_per_sec,reset_counters,first_seen_commands";

/// Per-node CSV
pub fn render_csv(report: &AssessmentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", NODE_CSV_HEADER);
    for d in &report.nodes {
        let _ = writeln!(
            out,
            "{},{},{},{:.3},{},{:.2},{},{},{:.2},{:.2},{},{:.2},{:.2},{:.2},{:.2},{:.2},{},{}",
            csv_field(&d.display_name),
            csv_field(&d.address),
            d.role,
            d.elapsed_secs,
            d.restarted,
            d.ops_per_sec,
            d.net_input_bytes,
            d.net_output_bytes,
            d.input_kbps,
            d.output_kbps,
            d.hit_ratio.map(|r| format!("{:.4}", r)).unwrap_or_default(),
            d.ecpu.read_ecpu,
            d.ecpu.write_ecpu,
            d.ecpu.other_ecpu,
            d.ecpu.total_ecpu,
            d.ecpu.ecpu_per_sec,
            d.reset_counters.len(),
            d.first_seen_commands.len(),
        );
    }
    out
}

pub const COMMAND_CSV_HEADER: &str =
    "node,address,command,category,calls,usec,usec_per_call,calls_per_sec,rejected_calls,failed_calls";

/// Per-node, per-command CSV
pub fn render_commands_csv(report: &AssessmentReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", COMMAND_CSV_HEADER);
    for d in &report.nodes {
        for c in &d.commands {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{:.2},{:.2},{},{}",
                csv_field(&d.display_name),
                csv_field(&d.address),
                csv_field(&c.command),
                format!("{:?}", c.category).to_lowercase(),
                c.calls,
                c.usec,
                c.usec_per_call,
                c.calls_per_sec,
                c.rejected_calls,
                c.failed_calls,
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assess::{RoundFailure, RunMetadata, TopologySummary};
    use crate::cluster::{
        ClusterNode, ClusterTopology, FailureKind, NodeFailure, NodeRole, TopologyDiff,
    };
    use crate::config::{NodeScope, ServerAddress};
    use crate::metrics::delta::{CommandDelta, NodeDelta};
    use crate::metrics::ecpu::{CommandCategory, EcpuEstimate};
    use crate::metrics::{top_commands, ClusterTotals};

    fn sample_report() -> AssessmentReport {
        let seed = ServerAddress::new("10.0.0.1", 6379);
        let topology = ClusterTopology::from_replication_info(&seed, "role:master\r\n");
        let node = ClusterNode::standalone("10.0.0.1", 6379, NodeRole::Primary);
        let delta = NodeDelta {
            address: node.address(),
            display_name: "1-1-P".to_string(),
            role: NodeRole::Primary,
            elapsed_secs: 10.0,
            restarted: false,
            fields: Vec::new(),
            commands: vec![CommandDelta {
                command: "get".to_string(),
                category: CommandCategory::Read,
                calls: 100,
                usec: 200,
                usec_per_call: 2.0,
                rejected_calls: 0,
                failed_calls: 0,
                calls_per_sec: 10.0,
            }],
            first_seen_commands: vec!["hgetall".to_string()],
            reset_counters: Vec::new(),
            net_input_bytes: 1024,
            net_output_bytes: 2048,
            input_kbps: 0.1,
            output_kbps: 0.2,
            ops_per_sec: 10.0,
            hit_ratio: Some(0.5),
            ecpu: EcpuEstimate {
                read_ecpu: 100.0,
                total_ecpu: 100.0,
                ecpu_per_sec: 10.0,
                ..Default::default()
            },
        };
        let nodes = vec![delta];
        AssessmentReport {
            metadata: RunMetadata {
                tool_version: "test".to_string(),
                seeds: vec![seed.to_string()],
                scope: NodeScope::All,
                sections: vec!["all".to_string()],
                requested_duration_secs: 10,
                measured_secs: 10.0,
                ecpu_baseline_usec: 20.0,
                started_unix_ms: 1,
                finished_unix_ms: 2,
            },
            topology: TopologySummary::from_topology(&topology),
            totals: ClusterTotals::from_deltas(&nodes),
            top_commands: top_commands(&nodes, 10),
            nodes,
            fields: Vec::new(),
            topology_changes: TopologyDiff::default(),
            first_seen_nodes: Vec::new(),
            failures: vec![RoundFailure {
                round: "final".to_string(),
                failure: NodeFailure {
                    address: "10.0.0.2:6379".to_string(),
                    role: NodeRole::Replica,
                    kind: FailureKind::Timeout,
                    reason: "no result, timed out".to_string(),
                },
            }],
            keyspace_samples: Vec::new(),
        }
    }

    #[test]
    fn test_text_report_sections() {
        let text = render_text(&sample_report());
        assert!(text.contains("[Topology]"));
        assert!(text.contains("[Nodes]"));
        assert!(text.contains("1-1-P"));
        assert!(text.contains("[Top commands]"));
        assert!(text.contains("[Failures]"));
        assert!(text.contains("Partial result"));
    }

    #[test]
    fn test_json_report() {
        let json = render_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["nodes"][0]["commands"][0]["command"], "get");
        assert_eq!(value["nodes"][0]["role"], "primary");
        assert_eq!(value["failures"][0]["kind"], "timeout");
        assert_eq!(value["failures"][0]["round"], "final");
        assert_eq!(value["metadata"]["scope"], "all");
    }

    #[test]
    fn test_csv_report() {
        let csv = render_csv(&sample_report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], NODE_CSV_HEADER);
        assert!(lines[1].starts_with("1-1-P,10.0.0.1:6379,primary,10.000,false,10.00,1024,2048"));
        assert_eq!(
            lines[0].split(',').count(),
            lines[1].split(',').count()
        );
    }

    #[test]
    fn test_commands_csv() {
        let csv = render_commands_csv(&sample_report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], COMMAND_CSV_HEADER);
        assert_eq!(lines[1], "1-1-P,10.0.0.1:6379,get,read,100,200,2.00,10.00,0,0");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        Reporter::new(OutputFormat::Json)
            .write(&sample_report(), Some(&path))
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"tool_version\": \"test\""));
    }
}
