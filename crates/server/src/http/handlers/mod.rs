pub mod admin;
pub mod drafts;
pub mod replies;
pub mod sse;

use adapter::{DraftError, OutboxError};
use axum::http::StatusCode;
use domain::FullName;

pub type ApiError = (StatusCode, String);

pub fn parse_full_name(raw: String) -> Result<FullName, ApiError> {
    FullName::new(raw).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

pub fn outbox_error(e: OutboxError) -> ApiError {
    let status = match &e {
        OutboxError::Invalid(_) | OutboxError::NotLoggedIn => StatusCode::BAD_REQUEST,
        OutboxError::AlreadyPosted(_) | OutboxError::InFlight(_) => StatusCode::CONFLICT,
        OutboxError::DebugOnly(_) => StatusCode::FORBIDDEN,
        OutboxError::Remote(_) => StatusCode::BAD_GATEWAY,
        OutboxError::Storage(_) | OutboxError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

pub fn draft_error(e: DraftError) -> ApiError {
    let status = match &e {
        DraftError::Invalid(_) => StatusCode::BAD_REQUEST,
        DraftError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
