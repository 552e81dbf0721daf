use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use domain::FullName;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::traits::ReplyPoster;

#[derive(Clone)]
pub struct RedditConfig {
    pub base_url: String,
    pub access_token: String,
    pub user_agent: String,
}

pub struct RedditDriver {
    config: RedditConfig,
    http: reqwest::Client,
}

impl RedditDriver {
    pub fn new(config: RedditConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { config, http })
    }
}

// POST /api/comment (api_type=json) 的响应
#[derive(Deserialize, Debug)]
struct CommentResponse {
    json: CommentResponseBody,
}

#[derive(Deserialize, Debug)]
struct CommentResponseBody {
    #[serde(default)]
    errors: Vec<Vec<Value>>,
    data: Option<CommentResponseData>,
}

#[derive(Deserialize, Debug)]
struct CommentResponseData {
    things: Vec<Thing>,
}

#[derive(Deserialize, Debug)]
struct Thing {
    data: ThingData,
}

#[derive(Deserialize, Debug)]
struct ThingData {
    id: String,
}

fn extract_reply_id(payload: Value) -> Result<String> {
    let response: CommentResponse =
        serde_json::from_value(payload).context("Unexpected reply response shape")?;

    if let Some(first) = response.json.errors.first() {
        let reason = first
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(": ");
        bail!("Remote rejected reply: {}", reason);
    }

    response
        .json
        .data
        .and_then(|d| d.things.into_iter().next())
        .map(|thing| thing.data.id)
        .ok_or_else(|| anyhow!("Reply response contained no comment"))
}

#[async_trait]
impl ReplyPoster for RedditDriver {
    async fn reply(&self, parent: &FullName, body: &str) -> Result<String> {
        let url = format!("{}/api/comment", self.config.base_url.trim_end_matches('/'));
        debug!("Posting reply to {}", parent);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .form(&[
                ("api_type", "json"),
                ("thing_id", parent.as_str()),
                ("text", body),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Reply rejected with HTTP {}: {}", status, text);
        }

        let payload: Value = resp.json().await.context("Invalid reply response body")?;
        extract_reply_id(payload)
    }
}
