use crate::models::{FullName, PendingSyncReply};
use serde::{Deserialize, Serialize};

/// 发件箱表的变更通知，供实时查询重新拉取快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxEvent {
    ReplySaved {
        reply: PendingSyncReply,
    },
    RepliesRemoved {
        // None 表示跨所有帖子 (purge)
        parent_submission_id: Option<FullName>,
        count: u64,
    },
}

impl OutboxEvent {
    pub fn touches_submission(&self, submission: &FullName) -> bool {
        match self {
            OutboxEvent::ReplySaved { reply } => &reply.parent_submission_id == submission,
            OutboxEvent::RepliesRemoved {
                parent_submission_id,
                ..
            } => parent_submission_id
                .as_ref()
                .map_or(true, |id| id == submission),
        }
    }
}
