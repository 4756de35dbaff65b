//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use crate::command::{CommandReply, VersionEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sociograph_core::{Edge, ErrorKind, GraphError, RenderView, RetrainReport, VersionId};

pub use crate::command::StatusReport as StatusResponse;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ERROR BODY
// =============================================================================

/// Error details shared by every failing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&GraphError> for ErrorBody {
    fn from(e: &GraphError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

// =============================================================================
// COMMAND RESPONSE
// =============================================================================

/// Result of `POST /command`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub error: Option<ErrorBody>,
}

impl CommandResponse {
    pub fn success(reply: CommandReply) -> Self {
        Self {
            success: true,
            message: Some(reply.message),
            data: reply.data,
            error: None,
        }
    }

    pub fn error(e: &GraphError) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(ErrorBody::from(e)),
        }
    }
}

// =============================================================================
// HISTORY / VERSIONS / VIEW
// =============================================================================

/// Undo and redo labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Oldest first.
    pub undo: Vec<String>,
    /// Next redo first.
    pub redo: Vec<String>,
}

/// Known versions of the session's subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub subject: String,
    pub current: Option<VersionId>,
    pub versions: Vec<VersionEntry>,
}

/// What a renderer needs to draw the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewResponse {
    #[serde(flatten)]
    pub view: RenderView,
    pub predicted_edges: Vec<Edge>,
}

// =============================================================================
// RETRAIN
// =============================================================================

/// Lifecycle of the server's retrain job, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// `?wait=true` blocks until the trainer finishes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RetrainParams {
    #[serde(default)]
    pub wait: bool,
}

/// Result of the `/retrain` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainResponse {
    pub state: RetrainState,
    /// Version the running job will create.
    pub target: Option<VersionId>,
    pub report: Option<RetrainReport>,
    pub error: Option<ErrorBody>,
}

impl RetrainResponse {
    pub fn idle() -> Self {
        Self::with_state(RetrainState::Idle, None)
    }

    pub fn running(target: Option<VersionId>) -> Self {
        Self::with_state(RetrainState::Running, target)
    }

    pub fn cancelled(target: Option<VersionId>) -> Self {
        Self::with_state(RetrainState::Cancelled, target)
    }

    pub fn completed(report: RetrainReport) -> Self {
        Self {
            state: RetrainState::Completed,
            target: Some(report.version),
            report: Some(report),
            error: None,
        }
    }

    pub fn failed(e: &GraphError) -> Self {
        Self {
            state: RetrainState::Failed,
            target: None,
            report: None,
            error: Some(ErrorBody::from(e)),
        }
    }

    fn with_state(state: RetrainState, target: Option<VersionId>) -> Self {
        Self {
            state,
            target,
            report: None,
            error: None,
        }
    }
}
