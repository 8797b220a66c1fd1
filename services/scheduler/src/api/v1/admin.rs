//! Operator endpoints: manual triggers and read-only status.
//!
//! Manual triggers take the same locks as the timed jobs, so they return
//! 409 instead of running concurrently with a replica's job.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::locks::{LockOutcome, LockStatus};
use crate::polls::{Poll, PollStatus};
use crate::rotation::GenerationOutcome;
use crate::state::AppState;

/// Retention applied by the archive endpoint when none is given.
const DEFAULT_ARCHIVE_DAYS: u32 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rotation/run", post(run_rotation))
        .route("/rotation/generate", post(force_generate))
        .route("/locks", get(list_locks))
        .route("/locks/cleanup", post(cleanup_locks))
        .route("/polls", get(list_polls))
        .route("/polls/archive", post(archive_polls))
}

fn busy(request_id: &str) -> ApiError {
    ApiError::conflict(
        "rotation_in_progress",
        "the rotation lock is held by another run; try again shortly",
    )
    .with_request_id(request_id)
}

async fn run_rotation(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    info!(request_id = %request_id, "Manual rotation requested");

    match state.runner().run_rotation().await {
        Ok(LockOutcome::Acquired(summary)) => Ok(Json(summary)),
        Ok(LockOutcome::Skipped) => Err(busy(&request_id)),
        Err(e) => {
            error!(error = %e, request_id = %request_id, "Manual rotation failed");
            Err(ApiError::from(e).with_request_id(request_id))
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    /// False when the slot was already filled.
    created: bool,
    poll: Poll,
}

async fn force_generate(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    info!(request_id = %request_id, "Forced generation requested");

    match state.runner().force_generate().await {
        Ok(LockOutcome::Acquired(outcome)) => {
            let created = outcome.is_created();
            Ok(Json(GenerateResponse {
                created,
                poll: GenerationOutcome::into_poll(outcome),
            }))
        }
        Ok(LockOutcome::Skipped) => Err(busy(&request_id)),
        Err(e) => {
            error!(error = %e, request_id = %request_id, "Forced generation failed");
            Err(ApiError::from(e).with_request_id(request_id))
        }
    }
}

#[derive(Debug, Serialize)]
struct LocksResponse {
    items: Vec<LockStatus>,
}

async fn list_locks(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .runner()
        .lock_status()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id))?;
    Ok(Json(LocksResponse { items }))
}

#[derive(Debug, Serialize)]
struct CleanupResponse {
    reset: u64,
}

async fn cleanup_locks(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let reset = state
        .runner()
        .cleanup_locks()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id))?;
    Ok(Json(CleanupResponse { reset }))
}

#[derive(Debug, Deserialize)]
struct ListPollsQuery {
    status: Option<String>,
}

#[derive(Debug, Serialize)]
struct PollsResponse {
    items: Vec<Poll>,
}

async fn list_polls(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ListPollsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match query.status.as_deref() {
        None => PollStatus::Active,
        Some(raw) => raw.parse::<PollStatus>().map_err(|message| {
            ApiError::bad_request("invalid_status", message).with_request_id(&ctx.request_id)
        })?,
    };

    let items = state
        .polls()
        .list_by_status(status)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(&ctx.request_id))?;
    Ok(Json(PollsResponse { items }))
}

#[derive(Debug, Deserialize)]
struct ArchiveQuery {
    older_than_days: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ArchiveResponse {
    archived: u64,
    older_than_days: u32,
}

async fn archive_polls(
    State(state): State<AppState>,
    ctx: RequestContext,
    Query(query): Query<ArchiveQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = ctx.request_id;
    let days = query.older_than_days.unwrap_or(DEFAULT_ARCHIVE_DAYS);
    let retention = Duration::days(i64::from(days));

    match state.runner().archive_closed(retention).await {
        Ok(LockOutcome::Acquired(archived)) => Ok(Json(ArchiveResponse {
            archived,
            older_than_days: days,
        })),
        Ok(LockOutcome::Skipped) => Err(busy(&request_id)),
        Err(e) => {
            error!(error = %e, request_id = %request_id, "Archival failed");
            Err(ApiError::from(e).with_request_id(request_id))
        }
    }
}
