use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use super::{outbox_error, ApiError};
use crate::state::AppState;

// 仅 debug 构建可用；release 构建中 outbox 会直接拒绝
pub async fn purge_replies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing Authorization header".into(),
        ))?;
    let expected_token = format!("Bearer {}", state.admin_token);
    if auth_header != expected_token {
        return Err((StatusCode::FORBIDDEN, "Invalid Admin Token".into()));
    }

    let purged = state.outbox.purge_all().await.map_err(outbox_error)?;
    Ok(Json(serde_json::json!({ "purged": purged })))
}
