use domain::{DomainError, FullName, PendingSyncReply};
use sqlx::FromRow;

#[derive(FromRow)]
pub struct SqlPendingReply {
    pub parent_contribution_id: String,
    pub author_user_name: String,
    pub created_at_millis: i64,
    pub parent_submission_id: String,
    pub body: String,
    pub state: String,
    pub posted_id: Option<String>,
}

impl TryFrom<SqlPendingReply> for PendingSyncReply {
    type Error = DomainError;

    fn try_from(sql: SqlPendingReply) -> Result<Self, Self::Error> {
        Ok(PendingSyncReply {
            body: sql.body,
            state: sql.state.parse()?,
            parent_submission_id: FullName::new_unchecked(sql.parent_submission_id),
            parent_contribution_id: FullName::new_unchecked(sql.parent_contribution_id),
            author_user_name: sql.author_user_name,
            created_at_millis: sql.created_at_millis,
            posted_id: sql.posted_id.map(FullName::new_unchecked),
        })
    }
}

#[derive(FromRow)]
pub struct SqlDraftEntry {
    pub key: String,
    pub value: String,
}
