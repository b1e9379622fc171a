/**
 * HTTP READ API - JSON view of the aggregated mesh state
 *
 * ROLE: exposes snapshots to the browser dashboard and to scripts.
 * Read-only: every handler works on copies taken from the publisher,
 * nothing here can mutate node or message state.
 *
 * ROUTES: /health, /system/health, /snapshot, /status, /session,
 *         /nodes, /nodes/{id}, /messages[?since=<id>]
 */

use crate::health::{HealthTracker, KernelHealth};
use crate::models::{Battery, MessageRecord, NodeRecord, Position};
use crate::session::OperatorSession;
use crate::snapshot::{MeshSnapshot, SnapshotPublisher};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: String,
    pub display_name: Option<String>,
    pub battery: Option<Battery>,
    pub position: Option<Position>,
    pub last_update: String, // RFC3339
    pub stale: bool,
    pub stale_for_seconds: i64, // age in seconds
}

pub fn to_view(n: &NodeRecord, now: OffsetDateTime, stale_after: Duration) -> NodeView {
    let age = now - n.last_update;
    NodeView {
        node_id: n.node_id.clone(),
        display_name: n.display_name.clone(),
        battery: n.battery,
        position: n.position,
        last_update: n.last_update.format(&Rfc3339).unwrap_or_default(),
        stale: age > stale_after,
        stale_for_seconds: age.whole_seconds().max(0),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub publisher: SnapshotPublisher,
    pub health_tracker: HealthTracker,
    pub session: OperatorSession,
    pub stale_after: Duration,
}

#[derive(Debug, Deserialize)]
struct MessagesParams {
    since: Option<u64>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/snapshot", get(get_snapshot))
        .route("/status", get(get_status))
        .route("/session", get(get_session))
        .route("/nodes", get(get_nodes))
        .route("/nodes/{id}", get(get_node))
        .route("/messages", get(get_messages))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.publisher))
}

// GET /snapshot
async fn get_snapshot(State(app): State<AppState>) -> Json<MeshSnapshot> {
    Json(app.publisher.snapshot())
}

// GET /status
async fn get_status(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": app.publisher.status() }))
}

// GET /session
async fn get_session(State(app): State<AppState>) -> Json<OperatorSession> {
    Json(app.session.clone())
}

// GET /nodes (sorted by id)
async fn get_nodes(State(app): State<AppState>) -> Json<Vec<NodeView>> {
    let now = OffsetDateTime::now_utc();
    let list = app
        .publisher
        .nodes()
        .values()
        .map(|n| to_view(n, now, app.stale_after))
        .collect();
    Json(list)
}

// GET /nodes/{id}
async fn get_node(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NodeView>, StatusCode> {
    let Some(n) = app.publisher.node(&id) else {
        return Err(StatusCode::NOT_FOUND);
    };
    Ok(Json(to_view(&n, OffsetDateTime::now_utc(), app.stale_after)))
}

// GET /messages?since=<id>
async fn get_messages(
    State(app): State<AppState>,
    Query(params): Query<MessagesParams>,
) -> Json<Vec<MessageRecord>> {
    match params.since {
        Some(id) => Json(app.publisher.messages_since(id)),
        None => Json(app.publisher.messages()),
    }
}
