//! Assessment pipeline: two collection rounds and their comparison

pub mod orchestrator;
pub mod report;

pub use orchestrator::Orchestrator;
pub use report::{AssessmentReport, NodeSummary, RoundFailure, RunMetadata, TopologySummary};
