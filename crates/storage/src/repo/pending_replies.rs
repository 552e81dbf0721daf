use crate::{models::SqlPendingReply, Db};
use domain::{FullName, PendingSyncReply, ReplyKey, ReplyState};

const SELECT_COLUMNS: &str = r#"
    SELECT
        parent_contribution_id,
        author_user_name,
        created_at_millis,
        parent_submission_id,
        body,
        state,
        posted_id
    FROM pending_sync_replies
"#;

fn into_domain(rows: Vec<SqlPendingReply>) -> anyhow::Result<Vec<PendingSyncReply>> {
    rows.into_iter()
        .map(|row| PendingSyncReply::try_from(row).map_err(anyhow::Error::from))
        .collect()
}

impl Db {
    // 按 (parent_contribution_id, author_user_name, created_at_millis) 覆盖写入
    // 已存在的行只允许更新 state 与 posted_id
    pub async fn upsert_pending_reply(&self, reply: &PendingSyncReply) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_sync_replies (
                parent_contribution_id, author_user_name, created_at_millis,
                parent_submission_id, body, state, posted_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(parent_contribution_id, author_user_name, created_at_millis) DO UPDATE SET
                state = excluded.state,
                posted_id = excluded.posted_id
            "#,
        )
        .bind(reply.parent_contribution_id.as_str())
        .bind(&reply.author_user_name)
        .bind(reply.created_at_millis)
        .bind(reply.parent_submission_id.as_str())
        .bind(&reply.body)
        .bind(reply.state.as_str())
        .bind(reply.posted_id.as_ref().map(FullName::as_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_pending_reply(
        &self,
        key: &ReplyKey,
    ) -> anyhow::Result<Option<PendingSyncReply>> {
        let sql = format!(
            "{} WHERE parent_contribution_id = ? AND author_user_name = ? AND created_at_millis = ?",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, SqlPendingReply>(&sql)
            .bind(key.parent_contribution_id.as_str())
            .bind(&key.author_user_name)
            .bind(key.created_at_millis)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PendingSyncReply::try_from).transpose()?)
    }

    // 尚未在评论树中出现的回帖 (发送中 / 已发送)
    pub async fn list_in_flight_replies(
        &self,
        parent_submission_id: &FullName,
    ) -> anyhow::Result<Vec<PendingSyncReply>> {
        let sql = format!(
            "{} WHERE parent_submission_id = ? AND state IN (?, ?) ORDER BY created_at_millis ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, SqlPendingReply>(&sql)
            .bind(parent_submission_id.as_str())
            .bind(ReplyState::Posting.as_str())
            .bind(ReplyState::Posted.as_str())
            .fetch_all(&self.pool)
            .await?;

        into_domain(rows)
    }

    pub async fn list_failed_replies(&self) -> anyhow::Result<Vec<PendingSyncReply>> {
        let sql = format!(
            "{} WHERE state = ? ORDER BY created_at_millis ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, SqlPendingReply>(&sql)
            .bind(ReplyState::Failed.as_str())
            .fetch_all(&self.pool)
            .await?;

        into_domain(rows)
    }

    pub async fn delete_posted_replies(
        &self,
        parent_submission_id: &FullName,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "DELETE FROM pending_sync_replies WHERE state = ? AND parent_submission_id = ?",
        )
        .bind(ReplyState::Posted.as_str())
        .bind(parent_submission_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_failed_reply(&self, key: &ReplyKey) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM pending_sync_replies
            WHERE parent_contribution_id = ? AND author_user_name = ? AND created_at_millis = ?
              AND state = ?
            "#,
        )
        .bind(key.parent_contribution_id.as_str())
        .bind(&key.author_user_name)
        .bind(key.created_at_millis)
        .bind(ReplyState::Failed.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_all_replies(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM pending_sync_replies")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
