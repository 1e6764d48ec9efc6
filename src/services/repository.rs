use async_trait::async_trait;
use std::collections::HashMap;

use crate::{
    error::Result,
    models::{
        comment::{MainComment, ReplyComment},
        notification::Notification,
        user::{Blog, UserProfile},
    },
};

/// Persistence for the two-level comment tree.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn insert_main(&self, comment: &MainComment) -> Result<()>;

    /// `blog_id` is the blog of the owning main comment; it scopes reply counts.
    /// The parent check and the write are one unit: a reply whose main comment
    /// is already gone fails with `NotFound` and is never stored.
    async fn insert_reply(&self, blog_id: &str, reply: &ReplyComment) -> Result<()>;

    async fn get_main(&self, id: &str) -> Result<Option<MainComment>>;

    async fn get_reply(&self, id: &str) -> Result<Option<ReplyComment>>;

    /// Newest first. The count is over every main comment of the blog.
    async fn list_main(
        &self,
        blog_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<MainComment>, u64)>;

    /// Replies grouped by parent, oldest first inside each group. Parents
    /// without replies are absent from the map.
    async fn list_replies(&self, main_ids: &[String])
        -> Result<HashMap<String, Vec<ReplyComment>>>;

    async fn count_main(&self, blog_id: &str) -> Result<u64>;

    async fn count_replies(&self, blog_id: &str) -> Result<u64>;

    /// Removes the main comment and every reply under it as one unit.
    async fn delete_main_cascade(&self, id: &str) -> Result<()>;

    async fn delete_reply(&self, id: &str) -> Result<()>;
}

/// User and blog lookup.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    async fn get_blog(&self, blog_id: &str) -> Result<Option<Blog>>;

    async fn save_user(&self, user: &UserProfile) -> Result<()>;

    async fn save_blog(&self, blog: &Blog) -> Result<()>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    /// Newest first.
    async fn list_notifications(&self, receiver_id: &str) -> Result<Vec<Notification>>;

    /// Returns the updated record, or `None` if no notification with that id
    /// belongs to `receiver_id`.
    async fn mark_read(&self, id: &str, receiver_id: &str) -> Result<Option<Notification>>;

    async fn count_unread(&self, receiver_id: &str) -> Result<u64>;
}
