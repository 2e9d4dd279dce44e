//! Assessment orchestrator
//!
//! Discovers the topology, takes a baseline round, waits for the
//! measurement interval, takes a final round and turns the pair into an
//! `AssessmentReport`. Node-level problems are recorded in the report; the
//! run itself only fails when discovery fails or the baseline is empty.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::report::{AssessmentReport, RoundFailure, RunMetadata, TopologySummary};
use crate::client::{ConnectionFactory, RetryPolicy};
use crate::cluster::{
    discover_topology, fan_out, ClusterNode, ClusterTopology, FanOutConfig, NodeFailure,
};
use crate::config::{AssessConfig, NodeScope};
use crate::metrics::snapshot::unix_millis;
use crate::metrics::{
    aggregate_fields, collect_round, compute_node_delta, default_info_fields, sample_keyspace,
    top_commands, ClusterTotals, InfoFieldType, KeyspaceSample, NodeDelta, NodeSnapshot,
    SampleConfig,
};
use crate::utils::{CollectionError, Result};

/// Runs one assessment
pub struct Orchestrator {
    config: AssessConfig,
    fields: Vec<InfoFieldType>,
    show_progress: bool,
}

impl Orchestrator {
    pub fn new(config: AssessConfig) -> Self {
        let show_progress = !config.quiet;
        Self {
            config,
            fields: default_info_fields(),
            show_progress,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run the full pipeline
    pub fn run(&self) -> Result<AssessmentReport> {
        let started_unix_ms = unix_millis();
        let factory = self.config.connection_factory();
        let retry = self.config.retry_policy();
        let fan_out_config = self.config.fan_out_config();
        let sections = &self.config.sections;

        let topology = discover_topology(&factory, &self.config.seeds, &retry)?;
        let targets: Vec<ClusterNode> = topology
            .select(self.config.scope)
            .into_iter()
            .cloned()
            .collect();
        if targets.is_empty() {
            return Err(CollectionError::NoTargets.into());
        }

        info!("Collecting baseline from {} nodes", targets.len());
        let baseline = collect_round(
            "baseline",
            &factory,
            targets,
            sections,
            &fan_out_config,
            &retry,
        );
        if baseline.nodes.is_empty() {
            return Err(CollectionError::NothingCollected(baseline.failures.len()).into());
        }
        let round_start = Instant::now();

        self.wait_interval(baseline.node_count());

        let final_topology = match discover_topology(&factory, &self.config.seeds, &retry) {
            Ok(t) => t,
            Err(e) => {
                warn!("Re-discovery failed ({}), reusing the baseline topology", e);
                topology.clone()
            }
        };
        let final_targets = final_targets(
            &final_topology,
            &topology,
            &baseline.nodes,
            self.config.scope,
        );

        let last = collect_round(
            "final",
            &factory,
            final_targets,
            sections,
            &fan_out_config,
            &retry,
        );
        let measured_secs = round_start.elapsed().as_secs_f64();

        let model = self.config.ecpu_model();
        let mut deltas: Vec<NodeDelta> = Vec::new();
        for (address, base) in &baseline.nodes {
            if let Some(final_snapshot) = last.get(address) {
                let mut delta = compute_node_delta(base, final_snapshot, &self.fields, &model);
                if delta.restarted {
                    warn!("{} restarted during the interval, counters excluded", address);
                }
                delta.display_name = final_topology.display_name(address);
                deltas.push(delta);
            }
        }
        let first_seen_nodes: Vec<String> = last
            .nodes
            .keys()
            .filter(|a| !baseline.nodes.contains_key(*a))
            .cloned()
            .collect();

        let topology_changes = topology.diff(&final_topology);
        for line in topology_changes.describe() {
            warn!("Topology change: {}", line);
        }

        let mut failures: Vec<RoundFailure> = Vec::new();
        push_failures(&mut failures, "baseline", baseline.failures);
        push_failures(&mut failures, "final", last.failures);

        let keyspace_samples = match self.config.sample_config() {
            Some(sample_config) => {
                let (samples, sample_failures) = sample_round(
                    &factory,
                    &final_topology,
                    &sample_config,
                    &fan_out_config,
                );
                push_failures(&mut failures, "sample", sample_failures);
                samples
            }
            None => Vec::new(),
        };

        let totals = ClusterTotals::from_deltas(&deltas);
        let fields = aggregate_fields(&deltas, &self.fields);
        let top = top_commands(&deltas, self.config.top_commands);

        Ok(AssessmentReport {
            metadata: RunMetadata {
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                seeds: self.config.seeds.iter().map(|s| s.to_string()).collect(),
                scope: self.config.scope,
                sections: self.config.sections.clone(),
                requested_duration_secs: self.config.duration.as_secs(),
                measured_secs,
                ecpu_baseline_usec: self.config.ecpu_baseline_usec,
                started_unix_ms,
                finished_unix_ms: unix_millis(),
            },
            topology: TopologySummary::from_topology(&topology),
            nodes: deltas,
            totals,
            fields,
            top_commands: top,
            topology_changes,
            first_seen_nodes,
            failures,
            keyspace_samples,
        })
    }

    /// Sleep through the measurement interval, with a progress bar on stderr
    fn wait_interval(&self, nodes: usize) {
        let duration = self.config.duration;
        if duration.is_zero() {
            return;
        }

        let pb = if self.show_progress {
            ProgressBar::new(duration.as_secs())
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}s/{len}s | {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(format!("measuring {} nodes", nodes));

        let start = Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                break;
            }
            pb.set_position(elapsed.as_secs());
            thread::sleep((duration - elapsed).min(Duration::from_millis(200)));
        }
        pb.finish_with_message("collecting final snapshot");
    }
}

/// Final round targets: the new topology's scope plus every node that
/// answered the baseline, so failovers and removals still get measured
fn final_targets(
    final_topology: &ClusterTopology,
    baseline_topology: &ClusterTopology,
    baseline_nodes: &BTreeMap<String, NodeSnapshot>,
    scope: NodeScope,
) -> Vec<ClusterNode> {
    let mut targets: Vec<ClusterNode> = final_topology
        .select(scope)
        .into_iter()
        .cloned()
        .collect();
    let mut seen: BTreeSet<String> = targets.iter().map(|n| n.address()).collect();

    for address in baseline_nodes.keys() {
        if seen.contains(address) {
            continue;
        }
        let node = final_topology
            .get_node_by_address(address)
            .or_else(|| baseline_topology.get_node_by_address(address));
        if let Some(node) = node {
            seen.insert(address.clone());
            targets.push(node.clone());
        }
    }
    targets
}

fn push_failures(out: &mut Vec<RoundFailure>, round: &str, failures: Vec<NodeFailure>) {
    out.extend(failures.into_iter().map(|failure| RoundFailure {
        round: round.to_string(),
        failure,
    }));
}

/// Sample the keyspace of every available primary
fn sample_round(
    factory: &ConnectionFactory,
    topology: &ClusterTopology,
    sample_config: &SampleConfig,
    fan_out_config: &FanOutConfig,
) -> (Vec<KeyspaceSample>, Vec<NodeFailure>) {
    let targets: Vec<ClusterNode> = topology
        .primaries()
        .filter(|n| n.is_available())
        .cloned()
        .collect();
    info!("Sampling up to {} keys on {} primaries", sample_config.max_keys, targets.len());

    // Sampling walks many keys; the whole group budget applies per node
    let config = FanOutConfig {
        task_timeout: fan_out_config.group_timeout,
        ..fan_out_config.clone()
    };
    let factory = factory.clone();
    let sample_config = sample_config.clone();
    let retry = RetryPolicy::none();

    let result = fan_out(targets, &config, move |node| {
        retry.run(&format!("sample {}", node.address()), |_| {
            let mut conn = factory.create(&node.host, node.port)?;
            sample_keyspace(&mut conn, &node.address(), &sample_config)
        })
    });

    let samples = result.successes.into_iter().map(|(_, s)| s).collect();
    (samples, result.failures)
}
