use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{
    error::{AppError, Result},
    models::{
        comment::{MainComment, ReplyComment},
        notification::Notification,
        user::{Blog, UserProfile},
    },
    services::repository::{CommentRepository, Directory, NotificationRepository},
};

#[derive(Default)]
struct Tables {
    main_comments: HashMap<String, MainComment>,
    replies: HashMap<String, StoredReply>,
    users: HashMap<String, UserProfile>,
    blogs: HashMap<String, Blog>,
    notifications: Vec<Notification>,
}

#[derive(Clone)]
struct StoredReply {
    blog_id: String,
    reply: ReplyComment,
}

/// 进程内存储，开发环境和测试使用
///
/// Every operation takes the single lock once, so a cascade delete is never
/// observed half done.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn insert_main(&self, comment: &MainComment) -> Result<()> {
        debug!("Storing main comment {} on {}", comment.id, comment.parent_entity_id);
        let mut stored = comment.clone();
        stored.replies.clear();
        self.tables
            .write()
            .main_comments
            .insert(stored.id.clone(), stored);
        Ok(())
    }

    async fn insert_reply(&self, blog_id: &str, reply: &ReplyComment) -> Result<()> {
        debug!("Storing reply {} under {}", reply.id, reply.parent_comment_id);
        let mut tables = self.tables.write();
        if !tables.main_comments.contains_key(&reply.parent_comment_id) {
            return Err(AppError::not_found("Comment"));
        }
        tables.replies.insert(
            reply.id.clone(),
            StoredReply {
                blog_id: blog_id.to_string(),
                reply: reply.clone(),
            },
        );
        Ok(())
    }

    async fn get_main(&self, id: &str) -> Result<Option<MainComment>> {
        Ok(self.tables.read().main_comments.get(id).cloned())
    }

    async fn get_reply(&self, id: &str) -> Result<Option<ReplyComment>> {
        Ok(self.tables.read().replies.get(id).map(|r| r.reply.clone()))
    }

    async fn list_main(
        &self,
        blog_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<MainComment>, u64)> {
        let tables = self.tables.read();
        let mut comments: Vec<&MainComment> = tables
            .main_comments
            .values()
            .filter(|c| c.parent_entity_id == blog_id)
            .collect();
        let total = comments.len() as u64;

        // Newest first; id breaks ties so paging is stable.
        comments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let page = comments
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn list_replies(
        &self,
        main_ids: &[String],
    ) -> Result<HashMap<String, Vec<ReplyComment>>> {
        let tables = self.tables.read();
        let mut grouped: HashMap<String, Vec<ReplyComment>> = HashMap::new();

        for stored in tables.replies.values() {
            if main_ids.contains(&stored.reply.parent_comment_id) {
                grouped
                    .entry(stored.reply.parent_comment_id.clone())
                    .or_default()
                    .push(stored.reply.clone());
            }
        }

        for replies in grouped.values_mut() {
            replies.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }

        Ok(grouped)
    }

    async fn count_main(&self, blog_id: &str) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .main_comments
            .values()
            .filter(|c| c.parent_entity_id == blog_id)
            .count() as u64)
    }

    async fn count_replies(&self, blog_id: &str) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .replies
            .values()
            .filter(|r| r.blog_id == blog_id)
            .count() as u64)
    }

    async fn delete_main_cascade(&self, id: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let before = tables.replies.len();
        tables.replies.retain(|_, r| r.reply.parent_comment_id != id);
        let removed = before - tables.replies.len();
        tables.main_comments.remove(id);
        debug!("Deleted main comment {} with {} replies", id, removed);
        Ok(())
    }

    async fn delete_reply(&self, id: &str) -> Result<()> {
        self.tables.write().replies.remove(id);
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.tables.read().users.get(user_id).cloned())
    }

    async fn get_blog(&self, blog_id: &str) -> Result<Option<Blog>> {
        Ok(self.tables.read().blogs.get(blog_id).cloned())
    }

    async fn save_user(&self, user: &UserProfile) -> Result<()> {
        self.tables
            .write()
            .users
            .insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn save_blog(&self, blog: &Blog) -> Result<()> {
        self.tables
            .write()
            .blogs
            .insert(blog.blog_id.clone(), blog.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.tables.write().notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, receiver_id: &str) -> Result<Vec<Notification>> {
        let tables = self.tables.read();
        let mut notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|n| n.receiver_id == receiver_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_read(&self, id: &str, receiver_id: &str) -> Result<Option<Notification>> {
        let mut tables = self.tables.write();
        Ok(tables
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.receiver_id == receiver_id)
            .map(|n| {
                n.is_read = true;
                n.clone()
            }))
    }

    async fn count_unread(&self, receiver_id: &str) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .notifications
            .iter()
            .filter(|n| n.receiver_id == receiver_id && !n.is_read)
            .count() as u64)
    }
}
