//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        CommandResponse, HealthResponse, HistoryResponse, RetrainParams, RetrainResponse,
        StatusResponse, VersionsResponse, ViewResponse,
    },
};
use crate::command::{SessionCommand, run_command, version_entries};
use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sociograph_core::{ErrorKind, GraphError};
use std::sync::Arc;
use std::time::Duration;

/// How often `POST /retrain?wait=true` checks the running job.
const RETRAIN_WAIT_POLL: Duration = Duration::from_millis(25);

/// HTTP status for an error class.
#[must_use]
pub fn status_for(e: &GraphError) -> StatusCode {
    match e.kind() {
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidReference => StatusCode::NOT_FOUND,
        ErrorKind::DuplicateEntity | ErrorKind::EmptyHistory | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::TrainingFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::IoFailure | ErrorKind::InconsistentSelection => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// READ-ONLY HANDLERS
// =============================================================================

/// Get session status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    (StatusCode::OK, Json(StatusResponse::from_session(&session)))
}

/// Get undo and redo history.
pub async fn history_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let response = HistoryResponse {
        undo: session.history(),
        redo: session.redo_history(),
    };
    (StatusCode::OK, Json(response))
}

/// List versions of the subject.
pub async fn versions_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let response = VersionsResponse {
        subject: session.context().subject().to_string(),
        current: session.context().current(),
        versions: version_entries(&session),
    };
    (StatusCode::OK, Json(response))
}

/// Render view of the graph with the latest predictions.
pub async fn view_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.read().await;
    let response = ViewResponse {
        view: session.render_view(),
        predicted_edges: session.predicted_edges().to_vec(),
    };
    (StatusCode::OK, Json(response))
}

// =============================================================================
// COMMAND HANDLER
// =============================================================================

/// Run one session command.
///
/// `retrain` only starts the job here; follow it with `GET /retrain`.
pub async fn command_handler(
    State(state): State<AppState>,
    Json(command): Json<SessionCommand>,
) -> impl IntoResponse {
    let mut session = state.session.write().await;

    let result = match command {
        SessionCommand::Retrain => session
            .start_retrain(Arc::clone(&state.trainer))
            .map(|target| {
                CommandResponse::success(crate::command::CommandReply {
                    message: format!("retrain to {} started", target),
                    data: None,
                    quit: false,
                })
            }),
        SessionCommand::Quit => Err(GraphError::Usage(
            "quit is not available over HTTP".to_string(),
        )),
        other => run_command(&mut session, &state.trainer, other).map(CommandResponse::success),
    };

    match result {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => {
            tracing::warn!(error = %e, "command rejected");
            (status_for(&e), Json(CommandResponse::error(&e)))
        }
    }
}

// =============================================================================
// RETRAIN HANDLERS
// =============================================================================

/// Start a retrain, or with `?wait=true` run one to completion.
pub async fn retrain_start_handler(
    State(state): State<AppState>,
    Query(params): Query<RetrainParams>,
) -> impl IntoResponse {
    let target = {
        let mut session = state.session.write().await;
        match session.start_retrain(Arc::clone(&state.trainer)) {
            Ok(target) => target,
            Err(e) => return (status_for(&e), Json(RetrainResponse::failed(&e))),
        }
    };
    if !params.wait {
        return (StatusCode::ACCEPTED, Json(RetrainResponse::running(Some(target))));
    }

    // The lock is only taken per poll so reads proceed while training runs.
    loop {
        tokio::time::sleep(RETRAIN_WAIT_POLL).await;
        let mut session = state.session.write().await;
        if session.retrain_target() != Some(target) {
            let e = GraphError::NoRetrainJob;
            tracing::warn!(target = %target, "retrain was settled by another request");
            return (status_for(&e), Json(RetrainResponse::failed(&e)));
        }
        match session.poll_retrain() {
            Ok(None) => {}
            Ok(Some(report)) => return (StatusCode::OK, Json(RetrainResponse::completed(report))),
            Err(e) => return (status_for(&e), Json(RetrainResponse::failed(&e))),
        }
    }
}

/// Poll the running retrain, committing it if it finished.
pub async fn retrain_poll_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.write().await;
    if !session.is_retraining() {
        return (StatusCode::OK, Json(RetrainResponse::idle()));
    }
    let target = session.retrain_target();
    match session.poll_retrain() {
        Ok(None) => (StatusCode::OK, Json(RetrainResponse::running(target))),
        Ok(Some(report)) => (StatusCode::OK, Json(RetrainResponse::completed(report))),
        Err(e) => (status_for(&e), Json(RetrainResponse::failed(&e))),
    }
}

/// Cancel the running retrain.
pub async fn retrain_cancel_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut session = state.session.write().await;
    let target = session.retrain_target();
    match session.cancel_retrain() {
        Ok(()) => (StatusCode::OK, Json(RetrainResponse::cancelled(target))),
        Err(e) => (status_for(&e), Json(RetrainResponse::failed(&e))),
    }
}
