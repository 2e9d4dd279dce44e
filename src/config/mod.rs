//! Configuration module

pub mod assess_config;
pub mod cli;
pub mod tls_config;

pub use assess_config::{AssessConfig, AuthConfig, ServerAddress};
pub use cli::{CliArgs, NodeScope, OutputFormat};
pub use tls_config::TlsConfig;
