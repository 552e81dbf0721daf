use super::handlers::{admin, drafts, replies, sse};
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

pub fn build_router(state: AppState, allowed_origins: &str) -> Router {
    let cors = if allowed_origins == "*" {
        CorsLayer::new()
            .allow_methods(ALLOWED_METHODS)
            .allow_origin(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("CORS config is invalid or empty, falling back to allow ANY.");
            CorsLayer::new()
                .allow_methods(ALLOWED_METHODS)
                .allow_origin(Any)
                .allow_headers(Any)
        } else {
            tracing::info!("CORS enabled for origins: {:?}", origins);
            CorsLayer::new()
                .allow_methods(ALLOWED_METHODS)
                .allow_origin(origins)
                .allow_headers(Any)
        }
    };

    Router::new()
        .route(
            "/api/replies",
            post(replies::submit_reply).delete(admin::purge_replies),
        )
        .route("/api/replies/resend", post(replies::resend_reply))
        .route(
            "/api/replies/failed",
            get(replies::list_failed_replies).delete(replies::discard_failed_reply),
        )
        .route("/api/replies/failed/sse", get(sse::failed_replies_sse))
        .route(
            "/api/submissions/:submission_id/replies",
            get(replies::list_pending_replies),
        )
        .route(
            "/api/submissions/:submission_id/replies/sse",
            get(sse::pending_replies_sse),
        )
        .route(
            "/api/submissions/:submission_id/replies/posted",
            delete(replies::reconcile_replies),
        )
        .route(
            "/api/drafts/:target",
            get(drafts::get_draft)
                .put(drafts::save_draft)
                .delete(drafts::remove_draft),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
