//! HTTP API endpoints.
//!
//! Thin axum handlers over `AppState`. Every mutation answers with the
//! session's current snapshot so clients can replace their view wholesale.

pub mod error;
pub mod etag;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GameError;
use crate::state::AppState;
use crate::store::StoreExport;
use crate::types::*;
use error::json_body;
use etag::{if_none_match_hits, session_etag};

/// Tells pollers how long to wait between requests
pub const POLL_INTERVAL_HEADER: &str = "x-poll-interval";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerNameRequest {
    #[serde(default)]
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: GameAction,
}

/// Vote body. Missing fields deserialize empty and are rejected by the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub game_session_id: SessionId,
    #[serde(default)]
    pub prompt_id: PromptId,
    #[serde(default)]
    pub voter_id: PlayerId,
    #[serde(default)]
    pub target_id: PlayerId,
}

impl From<VoteRequest> for NewVote {
    fn from(req: VoteRequest) -> Self {
        NewVote {
            session_id: req.game_session_id,
            prompt_id: req.prompt_id,
            voter_id: req.voter_id,
            target_id: req.target_id,
        }
    }
}

impl From<&NewVote> for VoteRequest {
    fn from(vote: &NewVote) -> Self {
        VoteRequest {
            game_session_id: vote.session_id.clone(),
            prompt_id: vote.prompt_id.clone(),
            voter_id: vote.voter_id.clone(),
            target_id: vote.target_id.clone(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/game", get(list_sessions).post(create_session))
        .route(
            "/api/game/{code}",
            get(read_session).post(join_session).patch(patch_session),
        )
        .route("/api/game/{code}/actions", post(apply_action))
        .route("/api/game/{code}/results", get(session_results))
        .route("/api/vote", post(submit_vote))
        .route("/api/prompts", get(list_prompts))
        .route("/api/state/export", get(export_state))
        .route("/api/state/import", post(import_state))
        .with_state(state)
}

/// Snapshot response carrying its ETag and the poll interval
fn snapshot_response(state: &AppState, snapshot: SessionSnapshot) -> Response {
    let etag = session_etag(&snapshot.code, snapshot.version);
    let mut response = Json(snapshot).into_response();
    add_poll_headers(state, response.headers_mut(), &etag);
    response
}

fn add_poll_headers(state: &AppState, headers: &mut HeaderMap, etag: &str) {
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        POLL_INTERVAL_HEADER,
        HeaderValue::from(state.config.poll_interval.as_millis() as u64),
    );
}

/// Create a session with the caller as its first player.
///
/// POST /api/game
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PlayerNameRequest>, JsonRejection>,
) -> Result<Json<JoinedSession>, GameError> {
    let req = json_body(payload)?;
    Ok(Json(state.create_session(&req.player_name).await?))
}

/// GET /api/game
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionSnapshot>>, GameError> {
    Ok(Json(state.list_active_sessions().await?))
}

/// Read a session snapshot. Honours `If-None-Match` so pollers can skip
/// unchanged bodies.
///
/// GET /api/game/{code}
pub async fn read_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Response, GameError> {
    let snapshot = state.read_session(&code).await?;
    let etag = session_etag(&snapshot.code, snapshot.version);

    if if_none_match_hits(&headers, &etag) {
        let mut response = StatusCode::NOT_MODIFIED.into_response();
        add_poll_headers(&state, response.headers_mut(), &etag);
        return Ok(response);
    }
    Ok(snapshot_response(&state, snapshot))
}

/// POST /api/game/{code}
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    payload: Result<Json<PlayerNameRequest>, JsonRejection>,
) -> Result<Json<JoinedSession>, GameError> {
    let req = json_body(payload)?;
    Ok(Json(state.join_session(&code, &req.player_name).await?))
}

/// Partial update of phase and/or current prompt.
///
/// PATCH /api/game/{code}
pub async fn patch_session(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    payload: Result<Json<PhasePatch>, JsonRejection>,
) -> Result<Response, GameError> {
    let patch = json_body(payload)?;
    let snapshot = state.patch_session(&code, patch).await?;
    Ok(snapshot_response(&state, snapshot))
}

/// Server-computed transition.
///
/// POST /api/game/{code}/actions
pub async fn apply_action(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Response, GameError> {
    let req = json_body(payload)?;
    let snapshot = state.apply_action(&code, req.action).await?;
    Ok(snapshot_response(&state, snapshot))
}

/// GET /api/game/{code}/results
pub async fn session_results(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Tally>, GameError> {
    Ok(Json(state.session_results(&code).await?))
}

/// POST /api/vote
pub async fn submit_vote(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<VoteDetail>), GameError> {
    let req = json_body(payload)?;
    let vote = state.submit_vote(req.into()).await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

/// GET /api/prompts
pub async fn list_prompts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Prompt>>, GameError> {
    Ok(Json(state.list_prompts().await?))
}

/// Export the whole store as JSON.
///
/// GET /api/state/export
pub async fn export_state(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StoreExport>, GameError> {
    Ok(Json(state.export_state().await?))
}

/// Replace the whole store with an export.
///
/// POST /api/state/import
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StoreExport>, JsonRejection>,
) -> Result<Json<serde_json::Value>, GameError> {
    let export = json_body(payload)?;
    state.import_state(export).await?;
    Ok(Json(serde_json::json!({ "imported": true })))
}
