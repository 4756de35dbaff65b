//! # Sociograph HTTP API Module
//!
//! One editing session served over HTTP using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Subject, current version, graph metrics
//! - `GET /history` - Undo and redo labels
//! - `GET /versions` - Versions with their manifests
//! - `GET /view` - Render view with selection flags and predictions
//! - `POST /command` - Run a session command (`{"command": "add-node", ...}`)
//! - `POST /retrain` - Start a retrain (`?wait=true` to block until done)
//! - `GET /retrain` - Poll the running retrain
//! - `DELETE /retrain` - Cancel the running retrain
//!
//! Cross-origin access follows [`CorsOrigins`] from the app configuration;
//! by default only the server's own port on loopback is allowed.

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `sociograph::api::*`)
pub use handlers::{
    command_handler, health_handler, history_handler, retrain_cancel_handler,
    retrain_poll_handler, retrain_start_handler, status_for, status_handler, versions_handler,
    view_handler,
};
pub use types::{
    CommandResponse, ErrorBody, HealthResponse, HistoryResponse, RetrainParams, RetrainResponse,
    RetrainState, StatusResponse, VersionsResponse, ViewResponse,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use crate::config::CorsOrigins;
use sociograph_core::{GraphError, Session, Trainer};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request body limit for `POST /command`.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the session and the trainer used for retrains.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub trainer: Arc<dyn Trainer>,
}

impl AppState {
    #[must_use]
    pub fn new(session: Session, trainer: Arc<dyn Trainer>) -> Self {
        Self {
            session: Arc::new(RwLock::new(session)),
            trainer,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer for a server listening on `port`.
///
/// An origin that is not a valid header value is a usage error.
pub fn cors_layer(origins: &CorsOrigins, port: u16) -> Result<CorsLayer, GraphError> {
    let allowed: Vec<String> = match origins {
        CorsOrigins::Any => {
            tracing::warn!("CORS: allowing all origins");
            return Ok(CorsLayer::permissive());
        }
        CorsOrigins::Loopback => ["localhost", "127.0.0.1"]
            .iter()
            .map(|host| format!("http://{}:{}", host, port))
            .collect(),
        CorsOrigins::List(list) => list.clone(),
    };
    let values = allowed
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .map_err(|e| GraphError::Usage(format!("CORS origin '{}': {}", origin, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(origins = ?allowed, "CORS origins");

    Ok(CorsLayer::new()
        .allow_origin(values)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]))
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/history", get(handlers::history_handler))
        .route("/versions", get(handlers::versions_handler))
        .route("/view", get(handlers::view_handler))
        .route("/command", post(handlers::command_handler))
        .route(
            "/retrain",
            post(handlers::retrain_start_handler)
                .get(handlers::retrain_poll_handler)
                .delete(handlers::retrain_cancel_handler),
        )
        .layer(middleware)
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `session` on `host:port` until Ctrl+C.
pub async fn run_server(
    host: &str,
    port: u16,
    cors: &CorsOrigins,
    session: Session,
    trainer: Arc<dyn Trainer>,
) -> Result<(), GraphError> {
    let router = create_router(AppState::new(session, trainer), cors_layer(cors, port)?);
    let addr = format!("{}:{}", host, port);

    let listener = tokio::net::TcpListener::bind(addr.as_str())
        .await
        .map_err(|e| GraphError::IoFailure(format!("bind {}: {}", addr, e)))?;

    tracing::info!("Sociograph HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .map_err(|e| GraphError::IoFailure(format!("server error: {}", e)))
}
