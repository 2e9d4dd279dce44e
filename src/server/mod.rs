//! Read-only REST API over the assessment pipeline
//!
//! Every endpoint does blocking socket work, so handlers hand it to
//! `spawn_blocking` and only shape the JSON on the async side.

pub mod routes;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::RwLock;
use serde_json::json;
use tracing::info;

use crate::cluster::ClusterTopology;
use crate::config::{AssessConfig, ServerAddress};
use crate::utils::{AssessError, ClusterError, ConnectionError};

/// State shared by all handlers
pub struct ServerState {
    pub config: AssessConfig,
    /// Seed that last answered; tried first on the next request
    pub last_seed: RwLock<Option<ServerAddress>>,
    /// Topology from the most recent discovery
    pub topology: RwLock<Option<ClusterTopology>>,
}

impl ServerState {
    pub fn new(config: AssessConfig) -> Self {
        Self {
            config,
            last_seed: RwLock::new(None),
            topology: RwLock::new(None),
        }
    }

    /// Seeds in the order they should be tried
    pub fn seeds(&self) -> Vec<ServerAddress> {
        let mut seeds = self.config.seeds.clone();
        if let Some(last) = self.last_seed.read().clone() {
            seeds.retain(|s| s != &last);
            seeds.insert(0, last);
        }
        seeds
    }
}

/// API error type
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<AssessError> for ApiError {
    fn from(e: AssessError) -> Self {
        match e {
            AssessError::Cluster(ClusterError::NodeNotFound(_)) => ApiError::NotFound(e.to_string()),
            AssessError::Cluster(ClusterError::NoReachableSeed(_))
            | AssessError::Connection(ConnectionError::ConnectFailed { .. })
            | AssessError::Connection(ConnectionError::Timeout(_)) => {
                ApiError::Unavailable(e.to_string())
            }
            AssessError::Config(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Build the router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/health", get(routes::health))
        .route("/topology", get(routes::topology))
        .route("/metrics", get(routes::metrics))
        .route("/commandstats", get(routes::command_stats))
        .route("/delta", get(routes::delta))
        .route("/command", post(routes::command))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped
pub async fn serve(addr: &str, config: AssessConfig) -> std::io::Result<()> {
    let state = Arc::new(ServerState::new(config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("REST API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}
