mod error;
mod events;
mod models;
pub mod protocol;

pub use error::DomainError;
pub use events::OutboxEvent;
pub use models::{Contribution, FullName, PendingSyncReply, ReplyDraft, ReplyKey, ReplyState};
