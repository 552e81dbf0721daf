use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::{FullName, PendingSyncReply, ReplyKey};
use serde::Deserialize;
use tracing::warn;

use super::{outbox_error, parse_full_name, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SubmitReplyRequest {
    pub parent_submission_id: FullName,
    pub parent_contribution_id: FullName,
    pub body: String,
}

pub async fn submit_reply(
    State(state): State<AppState>,
    Json(payload): Json<SubmitReplyRequest>,
) -> Result<Json<PendingSyncReply>, ApiError> {
    let parent = payload.parent_contribution_id.clone();
    let posted = state
        .outbox
        .submit(
            payload.parent_submission_id,
            payload.parent_contribution_id,
            payload.body,
        )
        .await
        .map_err(outbox_error)?;

    // 发送成功后草稿已无意义
    if let Err(e) = state.drafts.remove_draft(&parent).await {
        warn!("Failed to clear draft for {}: {}", parent, e);
    }
    Ok(Json(posted))
}

pub async fn resend_reply(
    State(state): State<AppState>,
    Json(key): Json<ReplyKey>,
) -> Result<Json<PendingSyncReply>, ApiError> {
    let existing = state
        .outbox
        .find(&key)
        .await
        .map_err(outbox_error)?
        .ok_or((StatusCode::NOT_FOUND, "Reply not found".to_string()))?;

    let parent = existing.parent_contribution_id.clone();
    let posted = state.outbox.resend(existing).await.map_err(outbox_error)?;

    if let Err(e) = state.drafts.remove_draft(&parent).await {
        warn!("Failed to clear draft for {}: {}", parent, e);
    }
    Ok(Json(posted))
}

pub async fn list_pending_replies(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<Vec<PendingSyncReply>>, ApiError> {
    let submission_id = parse_full_name(submission_id)?;
    let replies = state
        .outbox
        .list_pending_or_posted(&submission_id)
        .await
        .map_err(outbox_error)?;
    Ok(Json(replies))
}

pub async fn list_failed_replies(
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingSyncReply>>, ApiError> {
    let replies = state.outbox.list_failed().await.map_err(outbox_error)?;
    Ok(Json(replies))
}

// 调用方已刷新评论树并确认回帖可见
pub async fn reconcile_replies(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let submission_id = parse_full_name(submission_id)?;
    let removed = state
        .outbox
        .reconcile(&submission_id)
        .await
        .map_err(outbox_error)?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}

pub async fn discard_failed_reply(
    State(state): State<AppState>,
    Json(key): Json<ReplyKey>,
) -> Result<Json<&'static str>, ApiError> {
    let discarded = state
        .outbox
        .discard_failed(&key)
        .await
        .map_err(outbox_error)?;
    if discarded {
        Ok(Json("Discarded"))
    } else {
        Err((StatusCode::NOT_FOUND, "No failed reply with that key".into()))
    }
}
