use crate::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 带类型前缀的远端标识，例如 `t3_abc` (帖子) 或 `t1_xyz` (评论)。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FullName(String);

impl FullName {
    pub fn new(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(DomainError::BlankIdentifier("full name"));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidIdentifier(s));
        }
        Ok(Self(s))
    }

    pub fn new_unchecked(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for FullName {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<FullName> for String {
    fn from(name: FullName) -> Self {
        name.0
    }
}

/// 可以被回复的对象 (帖子或评论)。远端模型的 full name 可能缺失。
pub trait Contribution {
    fn full_name(&self) -> Option<&str>;
}

impl Contribution for FullName {
    fn full_name(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl Contribution for str {
    fn full_name(&self) -> Option<&str> {
        Some(self)
    }
}

impl Contribution for Option<String> {
    fn full_name(&self) -> Option<&str> {
        self.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyState {
    Posting,
    Posted,
    Failed,
}

impl ReplyState {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplyState::Posting => "POSTING",
            ReplyState::Posted => "POSTED",
            ReplyState::Failed => "FAILED",
        }
    }

    /// 仍需要叠加在评论树上显示的状态。
    pub fn is_in_flight(self) -> bool {
        matches!(self, ReplyState::Posting | ReplyState::Posted)
    }
}

impl fmt::Display for ReplyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POSTING" => Ok(ReplyState::Posting),
            "POSTED" => Ok(ReplyState::Posted),
            "FAILED" => Ok(ReplyState::Failed),
            other => Err(DomainError::UnknownState(other.to_string())),
        }
    }
}

/// 一次回帖尝试的行身份。重发沿用同一个 key，从而覆盖旧行。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplyKey {
    pub parent_contribution_id: FullName,
    pub author_user_name: String,
    pub created_at_millis: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSyncReply {
    pub body: String,
    pub state: ReplyState,
    pub parent_submission_id: FullName,
    pub parent_contribution_id: FullName,
    pub author_user_name: String,
    pub created_at_millis: i64,
    pub posted_id: Option<FullName>,
}

impl PendingSyncReply {
    pub fn posting(
        body: String,
        parent_submission_id: FullName,
        parent_contribution_id: FullName,
        author_user_name: String,
        created_at_millis: i64,
    ) -> Result<Self, DomainError> {
        if body.trim().is_empty() {
            return Err(DomainError::EmptyBody);
        }
        if author_user_name.trim().is_empty() {
            return Err(DomainError::BlankIdentifier("author user name"));
        }
        Ok(Self {
            body,
            state: ReplyState::Posting,
            parent_submission_id,
            parent_contribution_id,
            author_user_name,
            created_at_millis,
            posted_id: None,
        })
    }

    pub fn key(&self) -> ReplyKey {
        ReplyKey {
            parent_contribution_id: self.parent_contribution_id.clone(),
            author_user_name: self.author_user_name.clone(),
            created_at_millis: self.created_at_millis,
        }
    }

    pub fn into_posted(self, posted_id: FullName) -> Self {
        Self {
            state: ReplyState::Posted,
            posted_id: Some(posted_id),
            ..self
        }
    }

    pub fn into_failed(self) -> Self {
        Self {
            state: ReplyState::Failed,
            posted_id: None,
            ..self
        }
    }
}

/// 草稿的序列化形态，以 JSON 存入 KV 表。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyDraft {
    pub body: String,
    pub created_at_millis: i64,
}
