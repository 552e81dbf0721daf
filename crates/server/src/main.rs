mod config;
mod http;
mod state;

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adapter::{DraftStore, RedditConfig, RemoteConfig, ReplyOutbox, StaticSession};
use crate::config::Settings;
use crate::http::router::build_router;
use crate::state::AppState;
use storage::Db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new().context("Failed to load configuration")?;

    let db = Db::new(&settings.database.url).await?;

    if settings.remote.access_token.is_empty() {
        warn!("remote.access_token is empty, replies will be rejected upstream");
    }
    let poster = adapter::connect_remote(RemoteConfig::Reddit(RedditConfig {
        base_url: settings.remote.base_url.clone(),
        access_token: settings.remote.access_token.clone(),
        user_agent: settings.remote.user_agent.clone(),
    }))?;

    let session = StaticSession::new(settings.session.user_name.clone());
    match &settings.session.user_name {
        Some(name) => info!("Replying as {}", name),
        None => warn!("session.user_name is not set, submitting replies will fail"),
    }

    let state = AppState {
        outbox: ReplyOutbox::new(db.clone(), poster, Arc::new(session)),
        drafts: DraftStore::new(db.clone(), settings.drafts.max_retain_days),
        admin_token: settings.security.admin_token.clone(),
    };

    let app = build_router(state, &settings.server.cors_origins);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address: {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
