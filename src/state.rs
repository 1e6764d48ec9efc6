use std::sync::Arc;

use crate::{
    config::Config,
    error::Result,
    services::{
        AuthService, ChannelHub, CommentRepository, CommentService, Database, Directory,
        MemoryStore, NotificationRepository, NotificationService, WebSocketService,
    },
    utils::middleware::WriteRateLimiter,
};

/// 应用程序的共享状态
/// 包含所有服务和配置的引用
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Config,

    /// 用户与博客查询
    pub directory: Arc<dyn Directory>,

    /// 认证服务
    pub auth_service: AuthService,

    /// 评论服务
    pub comment_service: CommentService,

    /// 通知服务
    pub notification_service: NotificationService,

    /// 评论推送连接
    pub websocket_service: WebSocketService,

    /// 写接口限流
    pub rate_limiter: Arc<WriteRateLimiter>,
}

impl AppState {
    /// Wires every service over the store selected by `config.database_url`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        if config.uses_memory_store() {
            let store = MemoryStore::new();
            Ok(Self::with_store(config, Arc::new(store.clone()), Arc::new(store.clone()), Arc::new(store)))
        } else {
            let db = Database::new(config).await?;
            db.verify_connection().await?;
            Ok(Self::with_store(config, Arc::new(db.clone()), Arc::new(db.clone()), Arc::new(db)))
        }
    }

    pub fn with_store(
        config: &Config,
        comments: Arc<dyn CommentRepository>,
        directory: Arc<dyn Directory>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        let hub = ChannelHub::new();
        let notification_service = NotificationService::new(notifications, comments.clone());
        let comment_service = CommentService::new(
            config,
            comments,
            directory.clone(),
            notification_service.clone(),
            Arc::new(hub.clone()),
        );

        Self {
            config: config.clone(),
            directory,
            auth_service: AuthService::new(config),
            comment_service,
            notification_service,
            websocket_service: WebSocketService::new(hub),
            rate_limiter: Arc::new(WriteRateLimiter::new(config.rate_limit_requests)),
        }
    }

    /// 获取分页配置
    pub fn get_page_size(&self, requested: Option<usize>) -> usize {
        self.config.page_size(requested)
    }
}
