//! Command-line argument parsing
//!
//! Arguments are grouped by category: connection, TLS, measurement,
//! concurrency, ECPU model, output and server mode.

use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;

/// Cluster-aware metrics collection and delta measurement for Valkey
#[derive(Parser, Debug, Clone)]
#[command(name = "valkey-assess")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct CliArgs {
    /// Print help information
    #[arg(long = "help", action = clap::ArgAction::Help)]
    help: (),

    // ===== Connection Options =====
    /// Seed hostname (repeat for several seeds)
    #[arg(short = 'h', long = "host", default_value = "127.0.0.1", action = clap::ArgAction::Append)]
    pub hosts: Vec<String>,

    /// Seed port
    #[arg(short = 'p', long = "port", default_value_t = 6379)]
    pub port: u16,

    /// Password for AUTH
    #[arg(short = 'a', long = "auth")]
    pub password: Option<String>,

    /// Username for ACL AUTH (requires --auth)
    #[arg(long = "user")]
    pub username: Option<String>,

    // ===== TLS Options =====
    /// Enable TLS connection
    #[arg(long = "tls")]
    pub tls: bool,

    /// Skip TLS certificate verification (insecure)
    #[arg(long = "tls-skip-verify")]
    pub tls_skip_verify: bool,

    /// CA certificate file for TLS
    #[arg(long = "tls-ca-cert")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Client certificate file for TLS
    #[arg(long = "tls-cert")]
    pub tls_cert: Option<PathBuf>,

    /// Client private key file for TLS
    #[arg(long = "tls-key")]
    pub tls_key: Option<PathBuf>,

    /// Server Name Indication for TLS
    #[arg(long = "tls-sni")]
    pub tls_sni: Option<String>,

    // ===== Measurement =====
    /// Seconds between baseline and final snapshot
    #[arg(long = "duration", default_value_t = 60)]
    pub duration_secs: u64,

    /// Which nodes to measure
    #[arg(long = "scope", value_enum, default_value_t = NodeScope::All)]
    pub scope: NodeScope,

    /// INFO sections to collect (one INFO call per section)
    #[arg(long = "sections", value_delimiter = ',', default_value = "all")]
    pub sections: Vec<String>,

    // ===== Concurrency =====
    /// Worker threads for per-node fan-out
    #[arg(long = "workers", default_value_t = 8)]
    pub workers: usize,

    /// Connection timeout in milliseconds
    #[arg(long = "connect-timeout", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Per-node task timeout in milliseconds
    #[arg(long = "task-timeout", default_value_t = 8000)]
    pub task_timeout_ms: u64,

    /// Timeout for a whole collection round in milliseconds
    #[arg(long = "group-timeout", default_value_t = 30000)]
    pub group_timeout_ms: u64,

    /// Attempts for transient failures (1 = no retry)
    #[arg(long = "retries", default_value_t = 3)]
    pub retries: u32,

    // ===== Keyspace Sampling =====
    /// Keys to sample per primary with SCAN (0 = disabled)
    #[arg(long = "sample-keys", default_value_t = 0)]
    pub sample_keys: usize,

    /// COUNT hint for SCAN
    #[arg(long = "scan-count", default_value_t = 100)]
    pub scan_count: usize,

    // ===== ECPU Model =====
    /// Command cost (usec per call) that maps to one ECPU
    #[arg(long = "ecpu-baseline-usec", default_value_t = 20.0)]
    pub ecpu_baseline_usec: f64,

    // ===== Output Options =====
    /// Report output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(long = "output-format", value_enum, default_value_t = OutputFormat::Text)]
    pub output_format: OutputFormat,

    /// Write per-command deltas to this CSV file
    #[arg(long = "csv")]
    pub csv_output: Option<PathBuf>,

    /// Commands listed in the top-commands table
    #[arg(long = "top-commands", default_value_t = 10)]
    pub top_commands: usize,

    /// Quiet mode (errors only, no progress bar)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    // ===== Server Mode =====
    /// Serve the REST API on this address instead of running one measurement
    #[arg(long = "serve")]
    pub serve: Option<String>,
}

/// Node selection for collection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeScope {
    /// Primaries and replicas
    #[default]
    All,
    /// Primaries only
    Primaries,
    /// Replicas only (falls back to primaries)
    Replicas,
}

/// Output format for results
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate argument combinations
    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_some() && self.password.is_none() {
            return Err("--user requires --auth to be set".to_string());
        }

        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err("--tls-cert and --tls-key must both be specified".to_string());
        }

        if self.serve.is_none() && self.duration_secs == 0 {
            return Err("--duration must be at least 1 second".to_string());
        }

        if self.workers == 0 {
            return Err("--workers must be at least 1".to_string());
        }

        if self.retries == 0 {
            return Err("--retries must be at least 1".to_string());
        }

        if self.task_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err("timeouts must be positive".to_string());
        }

        if self.task_timeout_ms > self.group_timeout_ms {
            return Err("--task-timeout cannot exceed --group-timeout".to_string());
        }

        if self.sections.iter().all(|s| s.trim().is_empty()) {
            return Err("--sections needs at least one section".to_string());
        }

        if !(self.ecpu_baseline_usec > 0.0) {
            return Err("--ecpu-baseline-usec must be positive".to_string());
        }

        if self.sample_keys > 0 && self.scan_count == 0 {
            return Err("--scan-count must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_args() {
        let args = CliArgs::parse_from(["test"]);
        assert_eq!(args.port, 6379);
        assert_eq!(args.hosts, vec!["127.0.0.1"]);
        assert_eq!(args.duration_secs, 60);
        assert_eq!(args.workers, 8);
        assert_eq!(args.sections, vec!["all"]);
        assert_eq!(args.scope, NodeScope::All);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_multiple_seeds_and_sections() {
        let args = CliArgs::parse_from([
            "test",
            "-h",
            "node-a",
            "-h",
            "node-b",
            "--sections",
            "stats,commandstats",
            "--scope",
            "primaries",
        ]);
        assert_eq!(args.hosts, vec!["node-a", "node-b"]);
        assert_eq!(args.sections, vec!["stats", "commandstats"]);
        assert_eq!(args.scope, NodeScope::Primaries);
    }

    #[test]
    fn test_validation_user_without_auth() {
        let args = CliArgs::parse_from(["test", "--user", "admin"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_task_timeout_over_group() {
        let args = CliArgs::parse_from([
            "test",
            "--task-timeout",
            "9000",
            "--group-timeout",
            "5000",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_zero_duration_allowed_in_serve_mode() {
        let args = CliArgs::parse_from(["test", "--duration", "0"]);
        assert!(args.validate().is_err());

        let args = CliArgs::parse_from(["test", "--duration", "0", "--serve", "0.0.0.0:8080"]);
        assert!(args.validate().is_ok());
    }
}
