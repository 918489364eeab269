use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use typerace_core::models::{Match, Ranking};

use crate::db;
use crate::error::ApiError;
use crate::matches;
use crate::queue::JoinOutcome;
use crate::state::AppState;

/// Uniform REST envelope: every 200 wraps its payload with a message.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(message: &str, data: T) -> Json<ApiResponse<T>> {
        Json(ApiResponse {
            message: message.to_string(),
            data,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn resolve(&self, default_limit: i64) -> (i64, i64) {
        let limit = self.limit.unwrap_or(default_limit).clamp(1, 100);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

/// Identity attached by the fronting auth layer.
fn identity(headers: &HeaderMap) -> Result<(String, String), ApiError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty());
    let username = headers
        .get("x-username")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty());
    match (user_id, username) {
        (Some(id), Some(name)) => Ok((id.to_string(), name.to_string())),
        _ => Err(ApiError::Unauthenticated),
    }
}

// ── Health ──────────────────────────────────────────────────────────────

pub async fn health() -> &'static str {
    "ok"
}

// ── Rankings ────────────────────────────────────────────────────────────

pub async fn get_ranking(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Ranking>>, ApiError> {
    let ranking = db::get_ranking(&state.db, &user_id)
        .await?
        .ok_or(ApiError::NotFound("Ranking"))?;
    Ok(ApiResponse::ok("Ranking retrieved", ranking))
}

#[derive(Debug, Serialize)]
pub struct LeaderboardData {
    pub leaderboard: Vec<Ranking>,
    pub total: i64,
}

pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<LeaderboardData>>, ApiError> {
    let (limit, offset) = page.resolve(50);
    let (leaderboard, total) = db::get_leaderboard(&state.db, limit, offset).await?;
    Ok(ApiResponse::ok(
        "Leaderboard retrieved",
        LeaderboardData { leaderboard, total },
    ))
}

// ── Queue ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueJoinData {
    pub queue_id: String,
    pub queue_size: usize,
}

pub async fn join_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<QueueJoinData>>, ApiError> {
    let (user_id, username) = identity(&headers)?;
    if state.queue.contains(&user_id) {
        return Err(ApiError::AlreadyInQueue);
    }
    if matches::user_in_live_match(&state, &user_id) {
        return Err(ApiError::AlreadyInMatch);
    }

    let queue_size = match state.queue.join(&user_id, &username) {
        JoinOutcome::Joined(size) | JoinOutcome::AlreadyQueued(size) => size,
    };
    state.broadcast_queue_status();
    matches::pair_off(&state).await;

    Ok(ApiResponse::ok(
        "Joined queue",
        QueueJoinData {
            queue_id: user_id,
            queue_size,
        },
    ))
}

#[derive(Debug, Serialize)]
pub struct Empty {}

pub async fn leave_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<Empty>>, ApiError> {
    let (user_id, _) = identity(&headers)?;
    if !state.queue.leave(&user_id) {
        return Err(ApiError::NotInQueue);
    }
    state.broadcast_queue_status();
    Ok(ApiResponse::ok("Left queue", Empty {}))
}

// ── Match history ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HistoryData {
    pub matches: Vec<Match>,
    pub total: i64,
}

pub async fn match_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<ApiResponse<HistoryData>>, ApiError> {
    let (limit, offset) = page.resolve(20);
    let (matches, total) = db::get_match_history(&state.db, &user_id, limit, offset).await?;
    Ok(ApiResponse::ok(
        "Match history retrieved",
        HistoryData { matches, total },
    ))
}
