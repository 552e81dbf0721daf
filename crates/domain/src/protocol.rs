use crate::error::DomainError;
use crate::models::{Contribution, FullName};

/// 远端评论 ID 的类型前缀。
pub const REPLY_KIND_PREFIX: &str = "t1_";

pub const DRAFT_KEY_PREFIX: &str = "draft:";

/// 远端只返回裸 ID，下游按 full name 索引评论节点。
pub fn reply_full_name(remote_id: &str) -> Result<FullName, DomainError> {
    let remote_id = remote_id.trim();
    if remote_id.is_empty() {
        return Err(DomainError::BlankIdentifier("remote reply id"));
    }
    FullName::new(format!("{}{}", REPLY_KIND_PREFIX, remote_id))
}

pub fn draft_key<C>(target: &C) -> Result<String, DomainError>
where
    C: Contribution + ?Sized,
{
    // 与回帖目标使用同一套校验
    let full_name = FullName::new(target.full_name().ok_or(DomainError::MissingFullName)?)?;
    Ok(format!("{}{}", DRAFT_KEY_PREFIX, full_name))
}
