pub mod auth;
pub mod channel;
pub mod comment;
pub mod database;
pub mod memory;
pub mod notification;
pub mod repository;
pub mod websocket;

// 重新导出常用类型
pub use auth::AuthService;
pub use channel::{ChannelHub, FanOutPublisher};
pub use comment::CommentService;
pub use database::Database;
pub use memory::MemoryStore;
pub use notification::NotificationService;
pub use repository::{CommentRepository, Directory, NotificationRepository};
pub use websocket::WebSocketService;
