use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use comment_sync::{
    config::Config,
    models::user::{Blog, UserProfile},
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "comment_sync=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting comment-sync service...");

    let config = Config::from_env()?;

    let app_state = Arc::new(AppState::from_config(&config).await?);
    if config.uses_memory_store() {
        warn!("DATABASE_URL=memory: comments live only as long as this process");
        if config.is_development() {
            seed_demo_directory(&app_state).await?;
        }
    } else {
        info!("Database connection established successfully");
    }

    let app = comment_sync::app(app_state);

    // 启动主服务器
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    info!("Starting server on http://{}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

/// Users and a blog to comment on when running against the memory store.
async fn seed_demo_directory(app_state: &AppState) -> anyhow::Result<()> {
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("xavier", "Xavier")] {
        app_state.directory.save_user(&UserProfile::new(id, name)).await?;
    }
    app_state
        .directory
        .save_blog(&Blog::new("demo-blog", "alice", "Demo blog"))
        .await?;

    info!("Seeded demo blog 'demo-blog' with users alice, bob, xavier");
    Ok(())
}
