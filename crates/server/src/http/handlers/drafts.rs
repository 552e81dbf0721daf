use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{draft_error, ApiError};
use crate::state::AppState;

#[derive(Deserialize, Serialize)]
pub struct DraftBody {
    pub body: String,
}

pub async fn get_draft(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<DraftBody>, ApiError> {
    let body = state
        .drafts
        .get_draft(target.as_str())
        .await
        .map_err(draft_error)?;
    Ok(Json(DraftBody { body }))
}

pub async fn save_draft(
    State(state): State<AppState>,
    Path(target): Path<String>,
    Json(payload): Json<DraftBody>,
) -> Result<Json<&'static str>, ApiError> {
    state
        .drafts
        .save_draft(target.as_str(), &payload.body)
        .await
        .map_err(draft_error)?;
    Ok(Json("Saved"))
}

pub async fn remove_draft(
    State(state): State<AppState>,
    Path(target): Path<String>,
) -> Result<Json<&'static str>, ApiError> {
    state
        .drafts
        .remove_draft(target.as_str())
        .await
        .map_err(draft_error)?;
    Ok(Json("Removed"))
}
