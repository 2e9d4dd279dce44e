//! Bounded fan-out of one task per node
//!
//! Jobs go through a bounded crossbeam queue to a fixed set of worker
//! threads. The caller waits on the result channel with `recv_timeout`
//! until every node answered or the group deadline passed. Workers still
//! busy at the deadline are left to finish on their own; their results are
//! dropped.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};
use serde::Serialize;
use tracing::{debug, warn};

use super::node::{ClusterNode, NodeRole};
use crate::utils::{AssessError, ConnectionError, Result};

/// Worker pool limits
#[derive(Debug, Clone)]
pub struct FanOutConfig {
    pub workers: usize,
    pub task_timeout: Duration,
    pub group_timeout: Duration,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            task_timeout: Duration::from_secs(8),
            group_timeout: Duration::from_secs(30),
        }
    }
}

/// Why a node produced no result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Connect,
    Command,
    Timeout,
}

impl FailureKind {
    /// Classify a task error
    pub fn of(err: &AssessError) -> Self {
        match err {
            AssessError::Connection(ConnectionError::Timeout(_)) => FailureKind::Timeout,
            AssessError::Connection(_) => FailureKind::Connect,
            AssessError::Io(e)
                if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) =>
            {
                FailureKind::Timeout
            }
            _ => FailureKind::Command,
        }
    }
}

/// A node that failed during a collection round
#[derive(Debug, Clone, Serialize)]
pub struct NodeFailure {
    pub address: String,
    pub role: NodeRole,
    pub kind: FailureKind,
    pub reason: String,
}

impl NodeFailure {
    fn new(node: &ClusterNode, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            address: node.address(),
            role: node.role,
            kind,
            reason: reason.into(),
        }
    }
}

/// Outcome of a fan-out; successes keep target order
#[derive(Debug)]
pub struct FanOutResult<T> {
    pub successes: Vec<(ClusterNode, T)>,
    pub failures: Vec<NodeFailure>,
    pub elapsed: Duration,
}

type TaskOutcome<T> = (usize, thread::Result<Result<T>>, Duration);

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `task` once per target on a bounded pool
pub fn fan_out<T, F>(targets: Vec<ClusterNode>, config: &FanOutConfig, task: F) -> FanOutResult<T>
where
    T: Send + 'static,
    F: Fn(&ClusterNode) -> Result<T> + Send + Sync + 'static,
{
    let start = Instant::now();
    let total = targets.len();
    if total == 0 {
        return FanOutResult {
            successes: Vec::new(),
            failures: Vec::new(),
            elapsed: start.elapsed(),
        };
    }

    let (job_tx, job_rx) = bounded::<(usize, ClusterNode)>(total);
    let (result_tx, result_rx) = unbounded::<TaskOutcome<T>>();
    let task = Arc::new(task);
    let cancelled = Arc::new(AtomicBool::new(false));

    for (idx, node) in targets.iter().enumerate() {
        // Capacity equals the job count, so this never blocks
        let _ = job_tx.send((idx, node.clone()));
    }
    drop(job_tx);

    let num_workers = config.workers.clamp(1, total);
    let mut spawn_failures = 0;
    for worker_id in 0..num_workers {
        let job_rx = job_rx.clone();
        let result_tx = result_tx.clone();
        let task = Arc::clone(&task);
        let cancelled = Arc::clone(&cancelled);

        let spawned = thread::Builder::new()
            .name(format!("fanout-{}", worker_id))
            .spawn(move || {
                while let Ok((idx, node)) = job_rx.recv() {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    let started = Instant::now();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(&node)));
                    if result_tx.send((idx, outcome, started.elapsed())).is_err() {
                        break;
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn fan-out worker {}: {}", worker_id, e);
            spawn_failures += 1;
        }
    }
    drop(result_tx);

    let mut outcomes: Vec<Option<(thread::Result<Result<T>>, Duration)>> =
        (0..total).map(|_| None).collect();

    if spawn_failures < num_workers {
        let deadline = start + config.group_timeout;
        let mut received = 0;
        while received < total {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match result_rx.recv_timeout(remaining) {
                Ok((idx, outcome, took)) => {
                    outcomes[idx] = Some((outcome, took));
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "Group deadline of {:?} reached with {}/{} nodes answered",
                        config.group_timeout, received, total
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
    cancelled.store(true, Ordering::Relaxed);

    let mut successes = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for (node, outcome) in targets.into_iter().zip(outcomes) {
        match outcome {
            None => failures.push(NodeFailure::new(
                &node,
                FailureKind::Timeout,
                format!("no result within group timeout of {:?}", config.group_timeout),
            )),
            Some((Err(payload), _)) => {
                let msg = panic_message(payload.as_ref());
                warn!("Task for {} panicked: {}", node.address(), msg);
                failures.push(NodeFailure::new(
                    &node,
                    FailureKind::Command,
                    format!("task panicked: {}", msg),
                ));
            }
            Some((Ok(_), took)) if took > config.task_timeout => {
                warn!(
                    "{} answered after {:?}, over the task timeout",
                    node.address(),
                    took
                );
                failures.push(NodeFailure::new(
                    &node,
                    FailureKind::Timeout,
                    format!("took {:?}, task timeout is {:?}", took, config.task_timeout),
                ));
            }
            Some((Ok(Err(e)), _)) => {
                warn!("{} failed: {}", node.address(), e);
                failures.push(NodeFailure::new(&node, FailureKind::of(&e), e.to_string()));
            }
            Some((Ok(Ok(value)), _)) => successes.push((node, value)),
        }
    }

    debug!(
        "Fan-out over {} nodes: {} ok, {} failed in {:?}",
        total,
        successes.len(),
        failures.len(),
        start.elapsed()
    );

    FanOutResult {
        successes,
        failures,
        elapsed: start.elapsed(),
    }
}
