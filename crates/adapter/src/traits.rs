use anyhow::Result;
use async_trait::async_trait;
use domain::FullName;

/// 远端回帖能力。成功返回远端分配的裸 ID (不带类型前缀)。
#[async_trait]
pub trait ReplyPoster: Send + Sync {
    async fn reply(&self, parent: &FullName, body: &str) -> Result<String>;
}

pub trait UserSession: Send + Sync {
    fn logged_in_user_name(&self) -> Option<String>;
}
