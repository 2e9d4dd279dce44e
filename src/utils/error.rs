//! Error types for valkey-assess

use std::io;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AssessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Collection error: {0}")]
    Collection(#[from] CollectionError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AssessError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AssessError::Connection(e) => e.is_transient(),
            AssessError::Protocol(ProtocolError::Server(msg)) => is_transient_server_error(msg),
            AssessError::Io(e) => is_transient_io(e),
            _ => false,
        }
    }
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("TLS handshake failed: {0}")]
    TlsFailed(String),

    #[error("Connection closed unexpectedly")]
    Closed,

    #[error("Connection timeout after {0}ms")]
    Timeout(u64),
}

impl ConnectionError {
    pub fn is_transient(&self) -> bool {
        match self {
            ConnectionError::ConnectFailed { source, .. } => is_transient_io(source),
            ConnectionError::Closed | ConnectionError::Timeout(_) => true,
            ConnectionError::AuthFailed(_) | ConnectionError::TlsFailed(_) => false,
        }
    }
}

/// RESP protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid RESP type byte: {0}")]
    InvalidType(u8),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Unexpected response to {command}: {actual}")]
    UnexpectedResponse { command: String, actual: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Cluster-related errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Failed to parse CLUSTER NODES response: {0}")]
    ParseFailed(String),

    #[error("No primary nodes found in cluster")]
    NoPrimaries,

    #[error("No seed node reachable: {0}")]
    NoReachableSeed(String),

    #[error("Node {0} not found in topology")]
    NodeNotFound(String),
}

/// Metrics collection errors
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("No nodes selected for collection")]
    NoTargets,

    #[error("Baseline collection failed on all {0} nodes")]
    NothingCollected(usize),
}

pub type Result<T> = std::result::Result<T, AssessError>;

fn is_transient_io(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Interrupted
    )
}

/// Server replies that signal a temporary condition (loading, failover, busy script)
pub(crate) fn is_transient_server_error(msg: &str) -> bool {
    let code = msg.split_whitespace().next().unwrap_or("");
    matches!(
        code,
        "LOADING" | "BUSY" | "TRYAGAIN" | "MASTERDOWN" | "CLUSTERDOWN"
    )
}
