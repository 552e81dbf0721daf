mod drafts;
mod drivers;
mod outbox;
mod traits;

pub use drafts::{DraftError, DraftStore};
pub use drivers::reddit::{RedditConfig, RedditDriver};
pub use drivers::session::StaticSession;
pub use outbox::{OutboxError, ReplyListStream, ReplyOutbox};
pub use traits::{ReplyPoster, UserSession};

use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub enum RemoteConfig {
    Reddit(RedditConfig),
}

pub fn connect_remote(config: RemoteConfig) -> anyhow::Result<Arc<dyn ReplyPoster>> {
    let poster: Arc<dyn ReplyPoster> = match config {
        RemoteConfig::Reddit(reddit_conf) => {
            info!("Initializing reply driver for {}", reddit_conf.base_url);
            Arc::new(RedditDriver::new(reddit_conf)?)
        }
    };
    Ok(poster)
}
