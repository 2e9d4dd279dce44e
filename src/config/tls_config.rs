//! TLS settings for node connections

use std::path::PathBuf;

use super::cli::CliArgs;

#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub skip_verify: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub sni: Option<String>,
}

impl TlsConfig {
    /// Build from CLI flags; `None` unless `--tls` was given
    pub fn from_cli(args: &CliArgs) -> Option<Self> {
        if !args.tls {
            return None;
        }
        Some(Self {
            skip_verify: args.tls_skip_verify,
            ca_cert: args.tls_ca_cert.clone(),
            client_cert: args.tls_cert.clone(),
            client_key: args.tls_key.clone(),
            sni: args.tls_sni.clone(),
        })
    }

    /// Server name used for the handshake with `host`.
    ///
    /// Cluster nodes are usually announced by IP, so an explicit SNI
    /// is needed when certificates are issued for the configuration endpoint.
    pub fn server_name<'a>(&'a self, host: &'a str) -> &'a str {
        self.sni.as_deref().unwrap_or(host)
    }
}
