use adapter::{DraftStore, ReplyOutbox};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub outbox: ReplyOutbox,
    pub drafts: DraftStore,
    pub admin_token: String,
}

impl FromRef<AppState> for ReplyOutbox {
    fn from_ref(state: &AppState) -> Self {
        state.outbox.clone()
    }
}

impl FromRef<AppState> for DraftStore {
    fn from_ref(state: &AppState) -> Self {
        state.drafts.clone()
    }
}
