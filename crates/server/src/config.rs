use config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub remote: RemoteSettings,
    #[serde(default)]
    pub session: SessionSettings,
    pub drafts: DraftSettings,
    pub security: SecuritySettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Deserialize, Clone)]
pub struct RemoteSettings {
    pub base_url: String,
    pub access_token: String,
    pub user_agent: String,
}

#[derive(Deserialize, Clone, Default)]
pub struct SessionSettings {
    // 未配置时视为未登录，提交回帖会被拒绝
    pub user_name: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct DraftSettings {
    pub max_retain_days: u32,
}

#[derive(Deserialize, Clone)]
pub struct SecuritySettings {
    pub admin_token: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());
        let env_map = collect_env_vars();

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("database.url", "sqlite://data/replybox.db")?
            .set_default("remote.base_url", "https://oauth.reddit.com")?
            .set_default("remote.access_token", "")?
            .set_default("remote.user_agent", "replybox/0.3")?
            .set_default("drafts.max_retain_days", 14)?
            .set_default("security.admin_token", "admin_secret_123")?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            .add_source(config::File::from_str(
                &serde_json::to_string(&env_map)
                    .expect("Environment variables should serialize to JSON"),
                config::FileFormat::Json,
            ))
            .build()?;

        s.try_deserialize()
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("REPLYBOX_"))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches("REPLYBOX_")
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}
