//! Assessment configuration derived from CLI arguments

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use super::cli::{CliArgs, NodeScope, OutputFormat};
use super::tls_config::TlsConfig;
use crate::client::{ConnectionFactory, RetryPolicy};
use crate::cluster::FanOutConfig;
use crate::metrics::{EcpuModel, SampleConfig};

/// Resolved server address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = String;

    /// Parses `host:port`; the last colon separates the port so IPv6 hosts work
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{}'", s))?;
        if host.is_empty() {
            return Err(format!("missing host in '{}'", s));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| format!("invalid port in '{}'", s))?;
        Ok(Self::new(host.trim_matches(|c| c == '[' || c == ']'), port))
    }
}

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub password: String,
    pub username: Option<String>,
}

/// Complete assessment configuration
#[derive(Debug, Clone)]
pub struct AssessConfig {
    // Connection
    pub seeds: Vec<ServerAddress>,
    pub auth: Option<AuthConfig>,
    pub tls: Option<TlsConfig>,
    pub connect_timeout: Duration,

    // Concurrency
    pub workers: usize,
    pub task_timeout: Duration,
    pub group_timeout: Duration,
    pub retries: u32,

    // Measurement
    pub duration: Duration,
    pub scope: NodeScope,
    pub sections: Vec<String>,
    pub sample_keys: usize,
    pub scan_count: usize,
    pub ecpu_baseline_usec: f64,

    // Output
    pub output_path: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub csv_output: Option<PathBuf>,
    pub top_commands: usize,
    pub quiet: bool,
    pub verbose: bool,

    // Server mode
    pub serve_addr: Option<String>,
}

impl AssessConfig {
    /// Create configuration from CLI arguments
    pub fn from_cli(args: &CliArgs) -> Result<Self, String> {
        args.validate()?;

        let seeds: Vec<ServerAddress> = args
            .hosts
            .iter()
            .map(|h| ServerAddress::new(h.clone(), args.port))
            .collect();

        let auth = args.password.as_ref().map(|p| AuthConfig {
            password: p.clone(),
            username: args.username.clone(),
        });

        let sections = args
            .sections
            .iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            seeds,
            auth,
            tls: TlsConfig::from_cli(args),
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),

            workers: args.workers,
            task_timeout: Duration::from_millis(args.task_timeout_ms),
            group_timeout: Duration::from_millis(args.group_timeout_ms),
            retries: args.retries,

            duration: Duration::from_secs(args.duration_secs),
            scope: args.scope,
            sections,
            sample_keys: args.sample_keys,
            scan_count: args.scan_count,
            ecpu_baseline_usec: args.ecpu_baseline_usec,

            output_path: args.output.clone(),
            output_format: args.output_format,
            csv_output: args.csv_output.clone(),
            top_commands: args.top_commands,
            quiet: args.quiet,
            verbose: args.verbose,

            serve_addr: args.serve.clone(),
        })
    }

    /// Connection factory shared by discovery and collection
    pub fn connection_factory(&self) -> ConnectionFactory {
        ConnectionFactory {
            connect_timeout: self.connect_timeout,
            io_timeout: self.task_timeout,
            tls_config: self.tls.clone(),
            auth_password: self.auth.as_ref().map(|a| a.password.clone()),
            auth_username: self.auth.as_ref().and_then(|a| a.username.clone()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_attempts(self.retries)
    }

    pub fn fan_out_config(&self) -> FanOutConfig {
        FanOutConfig {
            workers: self.workers,
            task_timeout: self.task_timeout,
            group_timeout: self.group_timeout,
        }
    }

    pub fn ecpu_model(&self) -> EcpuModel {
        EcpuModel {
            baseline_usec_per_call: self.ecpu_baseline_usec,
        }
    }

    /// Keyspace sampling settings, if enabled
    pub fn sample_config(&self) -> Option<SampleConfig> {
        if self.sample_keys == 0 {
            return None;
        }
        Some(SampleConfig {
            max_keys: self.sample_keys,
            scan_count: self.scan_count,
            pattern: None,
        })
    }

    /// Same configuration with a different measurement interval
    pub fn with_duration(&self, duration: Duration) -> Self {
        Self {
            duration,
            ..self.clone()
        }
    }
}
