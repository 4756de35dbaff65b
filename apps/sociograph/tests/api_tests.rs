//! Integration tests for the Sociograph HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use serde_json::{Value, json};
use sociograph::api::{
    AppState, CommandResponse, HealthResponse, HistoryResponse, RetrainResponse, RetrainState,
    StatusResponse, VersionsResponse, ViewResponse, cors_layer, create_router,
};
use sociograph::config::CorsOrigins;
use sociograph_core::{
    AttrValue, Attributes, CancelToken, CheckpointFormat, ErrorKind, GraphError, Session,
    SimilarityTrainer, SubjectId, Trainer, TrainingOutcome, TrainingRequest, VersionId,
    VersionManager,
};
use std::sync::Arc;
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a test server over a fresh subject in a temporary version root.
/// The directory must outlive the server.
fn create_test_server() -> (TestServer, TempDir) {
    let dir = TempDir::new().unwrap();
    let mgr = VersionManager::open(dir.path(), CheckpointFormat::Binary).unwrap();
    let session = Session::open(mgr, SubjectId::new("bats").unwrap(), None).unwrap();
    let state = AppState::new(session, Arc::new(SimilarityTrainer::default()));
    let cors = cors_layer(&CorsOrigins::Loopback, 8080).unwrap();
    (TestServer::new(create_router(state, cors)).unwrap(), dir)
}

async fn command(server: &TestServer, body: Value) -> (StatusCode, CommandResponse) {
    let response = server.post("/command").json(&body).await;
    (response.status_code(), response.json::<CommandResponse>())
}

/// Server with nodes a, b, c (all `sex=f`) and edge a-b.
async fn create_populated_test_server() -> (TestServer, TempDir) {
    let (server, dir) = create_test_server();
    for id in ["a", "b", "c"] {
        let (status, _) = command(
            &server,
            json!({"command": "add-node", "id": id, "attributes": {"sex": "f"}}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "add-node {id}");
    }
    let (status, _) = command(
        &server,
        json!({"command": "add-edge", "source": "a", "target": "b"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    (server, dir)
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _dir) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: HealthResponse = response.json();
    assert_eq!(body.status, "ok");
    assert!(!body.version.is_empty());
}

// =============================================================================
// CORS
// =============================================================================

fn allowed_origin(response: &axum_test::TestResponse) -> Option<String> {
    response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .map(|v| v.to_str().unwrap().to_string())
}

#[tokio::test]
async fn test_cors_loopback_follows_server_port() {
    let (server, _dir) = create_test_server();

    let own = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://127.0.0.1:8080"))
        .await;
    own.assert_status_ok();
    assert_eq!(allowed_origin(&own).as_deref(), Some("http://127.0.0.1:8080"));

    let other_port = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"))
        .await;
    assert_eq!(allowed_origin(&other_port), None);
}

#[tokio::test]
async fn test_cors_configured_origins() {
    let dir = TempDir::new().unwrap();
    let mgr = VersionManager::open(dir.path(), CheckpointFormat::Binary).unwrap();
    let session = Session::open(mgr, SubjectId::new("bats").unwrap(), None).unwrap();
    let state = AppState::new(session, Arc::new(SimilarityTrainer::default()));
    let origins = CorsOrigins::parse("http://lab.example:5173");
    let server =
        TestServer::new(create_router(state, cors_layer(&origins, 9000).unwrap())).unwrap();

    let lab = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://lab.example:5173"))
        .await;
    assert_eq!(allowed_origin(&lab).as_deref(), Some("http://lab.example:5173"));

    let loopback = server
        .get("/health")
        .add_header(header::ORIGIN, HeaderValue::from_static("http://localhost:9000"))
        .await;
    assert_eq!(allowed_origin(&loopback), None);
}

#[test]
fn test_cors_rejects_invalid_origin() {
    let bad = CorsOrigins::List(vec!["http://bad\norigin".to_string()]);
    let err = cors_layer(&bad, 8080).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Usage);
}

#[tokio::test]
async fn test_status_of_fresh_subject() {
    let (server, _dir) = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let body: StatusResponse = response.json();
    assert_eq!(body.subject.as_str(), "bats");
    assert_eq!(body.current_version, Some(VersionId(0)));
    assert_eq!(body.version_count, 1);
    assert_eq!(body.metrics.node_count, 0);
    assert!(!body.can_undo);
    assert!(body.retraining.is_none());
}

// =============================================================================
// COMMANDS
// =============================================================================

#[tokio::test]
async fn test_add_node_and_edge() {
    let (server, _dir) = create_populated_test_server().await;

    let body: StatusResponse = server.get("/status").await.json();
    assert_eq!(body.metrics.node_count, 3);
    assert_eq!(body.metrics.edge_count, 1);
    assert!(body.can_undo);
    assert!(!body.can_redo);
}

#[tokio::test]
async fn test_undo_then_redo() {
    let (server, _dir) = create_populated_test_server().await;

    let (status, body) = command(&server, json!({"command": "undo"})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.success);
    assert_eq!(body.message.as_deref(), Some("undid add-edge a b"));

    let status_body: StatusResponse = server.get("/status").await.json();
    assert_eq!(status_body.metrics.edge_count, 0);
    assert!(status_body.can_redo);

    let (status, _) = command(&server, json!({"command": "redo"})).await;
    assert_eq!(status, StatusCode::OK);
    let status_body: StatusResponse = server.get("/status").await.json();
    assert_eq!(status_body.metrics.edge_count, 1);
}

#[tokio::test]
async fn test_undo_on_empty_history_conflicts() {
    let (server, _dir) = create_test_server();

    let (status, body) = command(&server, json!({"command": "undo"})).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(!body.success);
    assert_eq!(body.error.unwrap().kind, ErrorKind::EmptyHistory);
}

#[tokio::test]
async fn test_edge_to_missing_node_is_not_found() {
    let (server, _dir) = create_populated_test_server().await;

    let (status, body) = command(
        &server,
        json!({"command": "add-edge", "source": "a", "target": "zz"}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body.error.unwrap().kind, ErrorKind::InvalidReference);

    let status_body: StatusResponse = server.get("/status").await.json();
    assert_eq!(status_body.metrics.edge_count, 1);
}

#[tokio::test]
async fn test_duplicate_node_conflicts() {
    let (server, _dir) = create_populated_test_server().await;

    let (status, body) = command(
        &server,
        json!({"command": "add-node", "id": "a", "attributes": {"sex": "m"}}),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body.error.unwrap().kind, ErrorKind::DuplicateEntity);
}

#[tokio::test]
async fn test_quit_is_rejected_over_http() {
    let (server, _dir) = create_test_server();

    let (status, body) = command(&server, json!({"command": "quit"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.error.unwrap().kind, ErrorKind::Usage);
}

#[tokio::test]
async fn test_unknown_command_is_client_error() {
    let (server, _dir) = create_test_server();

    let response = server
        .post("/command")
        .json(&json!({"command": "explode"}))
        .await;

    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_remove_selection_by_default() {
    let (server, _dir) = create_populated_test_server().await;

    let (status, _) = command(
        &server,
        json!({"command": "select", "nodes": ["a"], "edges": []}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = command(&server, json!({"command": "remove-node"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.message.as_deref(), Some("removed 1 node(s)"));

    let status_body: StatusResponse = server.get("/status").await.json();
    assert_eq!(status_body.metrics.node_count, 2);
    assert_eq!(status_body.metrics.edge_count, 0);
}

// =============================================================================
// HISTORY / VERSIONS / VIEW
// =============================================================================

#[tokio::test]
async fn test_history_endpoint() {
    let (server, _dir) = create_populated_test_server().await;
    command(&server, json!({"command": "undo"})).await;

    let body: HistoryResponse = server.get("/history").await.json();

    assert_eq!(body.undo, vec!["add-node a", "add-node b", "add-node c"]);
    assert_eq!(body.redo, vec!["add-edge a b"]);
}

#[tokio::test]
async fn test_versions_endpoint() {
    let (server, _dir) = create_test_server();

    let response = server.get("/versions").await;

    response.assert_status_ok();
    let body: VersionsResponse = response.json();
    assert_eq!(body.subject, "bats");
    assert_eq!(body.current, Some(VersionId(0)));
    assert_eq!(body.versions.len(), 1);
    assert!(body.versions[0].current);
}

#[tokio::test]
async fn test_view_marks_selection() {
    let (server, _dir) = create_populated_test_server().await;
    command(
        &server,
        json!({"command": "select", "nodes": ["c"], "edges": []}),
    )
    .await;

    let body: ViewResponse = server.get("/view").await.json();

    assert_eq!(body.view.nodes.len(), 3);
    assert_eq!(body.view.edges.len(), 1);
    let selected: Vec<&str> = body
        .view
        .nodes
        .iter()
        .filter(|n| n.selected)
        .map(|n| n.id.0.as_str())
        .collect();
    assert_eq!(selected, vec!["c"]);
    assert!(body.predicted_edges.is_empty());
}

// =============================================================================
// RETRAIN
// =============================================================================

#[tokio::test]
async fn test_poll_without_job_is_idle() {
    let (server, _dir) = create_test_server();

    let response = server.get("/retrain").await;

    response.assert_status_ok();
    let body: RetrainResponse = response.json();
    assert_eq!(body.state, RetrainState::Idle);
}

#[tokio::test]
async fn test_cancel_without_job_conflicts() {
    let (server, _dir) = create_test_server();

    let response = server.delete("/retrain").await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: RetrainResponse = response.json();
    assert_eq!(body.state, RetrainState::Failed);
    assert_eq!(body.error.unwrap().kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn test_retrain_wait_creates_next_version() {
    let (server, _dir) = create_populated_test_server().await;

    let response = server.post("/retrain").add_query_param("wait", "true").await;

    response.assert_status_ok();
    let body: RetrainResponse = response.json();
    assert_eq!(body.state, RetrainState::Completed);
    let report = body.report.unwrap();
    assert_eq!(report.version, VersionId(1));
    assert_eq!(report.parent, Some(VersionId(0)));

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.current_version, Some(VersionId(1)));
    assert_eq!(status.version_count, 2);
    assert_eq!(status.metrics.node_count, 3);

    let history: HistoryResponse = server.get("/history").await.json();
    assert_eq!(history.undo.len(), 1);
    assert!(history.redo.is_empty());
}

#[tokio::test]
async fn test_retrain_wait_leaves_reads_available() {
    let dir = TempDir::new().unwrap();
    let mgr = VersionManager::open(dir.path(), CheckpointFormat::Binary).unwrap();
    let mut session = Session::open(mgr, SubjectId::new("bats").unwrap(), None).unwrap();
    let mut attributes = Attributes::new();
    attributes.insert("sex".to_string(), AttrValue::from("f"));
    session.add_node("a", attributes).unwrap();
    let slow: Arc<dyn Trainer> = Arc::new(
        |_: &TrainingRequest, _: &CancelToken| -> Result<TrainingOutcome, GraphError> {
            std::thread::sleep(std::time::Duration::from_millis(600));
            Ok(TrainingOutcome::default())
        },
    );
    let cors = cors_layer(&CorsOrigins::Loopback, 8080).unwrap();
    let server = TestServer::new(create_router(AppState::new(session, slow), cors)).unwrap();

    let wait = async {
        let response = server.post("/retrain").add_query_param("wait", "true").await;
        (response, std::time::Instant::now())
    };
    let read = async {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let started = std::time::Instant::now();
        let response = server.get("/status").await;
        (response, started.elapsed(), std::time::Instant::now())
    };
    let ((waited, wait_done), (status, read_latency, read_done)) = tokio::join!(wait, read);

    status.assert_status_ok();
    assert!(read_done < wait_done, "status answered only after training");
    assert!(read_latency < std::time::Duration::from_millis(300));

    waited.assert_status_ok();
    let body: RetrainResponse = waited.json();
    assert_eq!(body.state, RetrainState::Completed);
    assert_eq!(body.report.unwrap().version, VersionId(1));
}
