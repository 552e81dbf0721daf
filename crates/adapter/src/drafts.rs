use chrono::{DateTime, Duration, Utc};
use domain::{protocol, Contribution, DomainError, ReplyDraft};
use std::collections::HashMap;
use storage::Db;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("invalid draft target: {0}")]
    Invalid(#[from] DomainError),

    #[error("draft storage failure: {0:#}")]
    Storage(anyhow::Error),
}

/// 按回复目标缓存未发送的草稿，每次保存时顺带回收过期草稿。
#[derive(Clone)]
pub struct DraftStore {
    db: Db,
    max_retain_days: u32,
}

impl DraftStore {
    pub fn new(db: Db, max_retain_days: u32) -> Self {
        Self {
            db,
            max_retain_days,
        }
    }

    pub async fn save_draft<C>(&self, target: &C, body: &str) -> Result<(), DraftError>
    where
        C: Contribution + ?Sized,
    {
        let key = protocol::draft_key(target)?;
        if body.is_empty() {
            return self.remove_key(&key).await;
        }

        let draft = ReplyDraft {
            body: body.to_string(),
            created_at_millis: Utc::now().timestamp_millis(),
        };
        let json = serde_json::to_string(&draft).map_err(|e| DraftError::Storage(e.into()))?;
        self.db
            .put_draft_value(&key, &json)
            .await
            .map_err(DraftError::Storage)?;

        let all_drafts = self.load_all_drafts().await?;
        self.recycle_old_drafts(&all_drafts).await?;
        Ok(())
    }

    /// 没有草稿时返回空字符串，调用方应把空串当作"无草稿"。
    pub async fn get_draft<C>(&self, target: &C) -> Result<String, DraftError>
    where
        C: Contribution + ?Sized,
    {
        let key = protocol::draft_key(target)?;
        let json = match self
            .db
            .get_draft_value(&key)
            .await
            .map_err(DraftError::Storage)?
        {
            Some(json) if !json.is_empty() => json,
            _ => return Ok(String::new()),
        };

        match serde_json::from_str::<ReplyDraft>(&json) {
            Ok(draft) => Ok(draft.body),
            Err(e) => {
                warn!("Unreadable draft under {}: {}", key, e);
                Ok(String::new())
            }
        }
    }

    pub async fn remove_draft<C>(&self, target: &C) -> Result<(), DraftError>
    where
        C: Contribution + ?Sized,
    {
        let key = protocol::draft_key(target)?;
        self.remove_key(&key).await
    }

    async fn remove_key(&self, key: &str) -> Result<(), DraftError> {
        self.db
            .remove_draft_value(key)
            .await
            .map_err(DraftError::Storage)
    }

    // 读取全部草稿；无法解析的条目直接清理掉
    async fn load_all_drafts(&self) -> Result<HashMap<String, ReplyDraft>, DraftError> {
        let entries = self
            .db
            .all_draft_values()
            .await
            .map_err(DraftError::Storage)?;

        let mut drafts = HashMap::with_capacity(entries.len());
        let mut unreadable = Vec::new();
        for (key, json) in entries {
            match serde_json::from_str::<ReplyDraft>(&json) {
                Ok(draft) => {
                    drafts.insert(key, draft);
                }
                Err(e) => {
                    warn!("Dropping unreadable draft {}: {}", key, e);
                    unreadable.push(key);
                }
            }
        }

        self.db
            .remove_draft_values(&unreadable)
            .await
            .map_err(DraftError::Storage)?;
        Ok(drafts)
    }

    /// 删除早于 `now - max_retain_days` 的草稿，返回删除数量。
    pub async fn recycle_old_drafts(
        &self,
        all_drafts: &HashMap<String, ReplyDraft>,
    ) -> Result<usize, DraftError> {
        let cutoff = retention_cutoff_millis(Utc::now(), self.max_retain_days);

        let stale: Vec<String> = all_drafts
            .iter()
            .filter(|(_, draft)| draft.created_at_millis < cutoff)
            .map(|(key, _)| key.clone())
            .collect();

        if !stale.is_empty() {
            debug!("Recycling {} stale drafts", stale.len());
            self.db
                .remove_draft_values(&stale)
                .await
                .map_err(DraftError::Storage)?;
        }
        Ok(stale.len())
    }
}

// 超出可表示的时间范围时不回收任何草稿
fn retention_cutoff_millis(now: DateTime<Utc>, max_retain_days: u32) -> i64 {
    now.checked_sub_signed(Duration::days(i64::from(max_retain_days)))
        .map_or(i64::MIN, |cutoff| cutoff.timestamp_millis())
}
