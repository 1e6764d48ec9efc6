use std::sync::Arc;
use structopt::StructOpt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comment_sync::{
    client::{HttpCommentApi, SyncClient, SyncOptions, SyncState, WsChannel},
    config::Config,
};

#[derive(StructOpt)]
#[structopt(name = "comment-watch", about = "Follow a blog's comments as they arrive")]
struct Opt {
    /// Blog whose comments to follow
    blog_id: String,

    /// REST base URL, defaults to API_BASE_URL
    #[structopt(long)]
    api: Option<String>,

    /// Channel websocket URL, defaults to CHANNEL_URL
    #[structopt(long)]
    channel: Option<String>,

    /// Bearer token sent with REST calls
    #[structopt(long)]
    token: Option<String>,

    /// Post this comment as --author once the thread is loaded
    #[structopt(long, requires = "author")]
    post: Option<String>,

    #[structopt(long)]
    author: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "comment_sync=info,comment_watch=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let opt = Opt::from_args();
    let config = Config::from_env()?;

    let api_url = opt.api.unwrap_or_else(|| config.api_base_url.clone());
    let channel_url = opt.channel.unwrap_or_else(|| config.channel_url.clone());

    let mut api = HttpCommentApi::new(&api_url)?;
    if let Some(token) = opt.token {
        api = api.with_token(token);
    }

    let (link, signals, _feed) = WsChannel::spawn(channel_url, config.channel_reconnect_delay());
    let handle = SyncClient::attach(
        opt.blog_id.clone(),
        SyncOptions::from_config(&config),
        Arc::new(api),
        link,
        signals,
    );

    if let (Some(text), Some(author)) = (opt.post, opt.author) {
        handle
            .wait_until(|s| s.state != SyncState::Loading)
            .await;
        match handle.post_comment(&author, &text).await {
            Ok(comment) => info!("Posted comment {}", comment.id),
            Err(e) => warn!("Failed to post comment: {}", e),
        }
    }

    let mut snapshots = handle.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    "{} [{:?}] {} of {} comments, {} polls",
                    opt.blog_id,
                    snapshot.state,
                    snapshot.cache.len(),
                    snapshot.cache.total,
                    snapshot.polls
                );
                if let Some(newest) = snapshot.cache.comments.first() {
                    info!("  newest: {}: {}", newest.author_display_name, newest.text);
                }
            }
        }
    }

    handle.detach().await;
    Ok(())
}
