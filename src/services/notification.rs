use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::notification::{
        Notification, NotificationType, NotificationView, DELETED_COMMENT_PLACEHOLDER,
    },
    services::repository::{CommentRepository, NotificationRepository},
};

/// A comment-created fact addressed to one receiver.
#[derive(Debug, Clone)]
pub struct ReplyNotice<'a> {
    pub sender_id: &'a str,
    pub sender_display_name: &'a str,
    pub receiver_id: &'a str,
    pub related_entity_id: &'a str,
    pub related_main_comment_id: &'a str,
    pub related_reply_comment_id: Option<&'a str>,
}

#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
    comments: Arc<dyn CommentRepository>,
}

impl NotificationService {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        comments: Arc<dyn CommentRepository>,
    ) -> Self {
        Self {
            notifications,
            comments,
        }
    }

    /// Records a reply notification. Returns `None` without writing anything
    /// when sender and receiver are the same user.
    pub async fn record_reply_notification(
        &self,
        notice: ReplyNotice<'_>,
    ) -> Result<Option<Notification>> {
        if notice.sender_id == notice.receiver_id {
            debug!("Skipping self-notification for user {}", notice.sender_id);
            return Ok(None);
        }

        let message = match notice.related_reply_comment_id {
            Some(_) => format!("{} replied to your comment", notice.sender_display_name),
            None => format!("{} commented on your blog", notice.sender_display_name),
        };

        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            notification_type: NotificationType::Reply,
            sender_id: notice.sender_id.to_string(),
            receiver_id: notice.receiver_id.to_string(),
            related_entity_id: notice.related_entity_id.to_string(),
            related_comment_id: Some(notice.related_main_comment_id.to_string()),
            related_reply_id: notice.related_reply_comment_id.map(str::to_string),
            is_read: false,
            message,
            created_at: Utc::now(),
        };

        self.notifications.insert_notification(&notification).await?;
        info!(
            "Recorded reply notification {} for user {}",
            notification.id, notification.receiver_id
        );

        Ok(Some(notification))
    }

    pub async fn list_notifications(&self, receiver_id: &str) -> Result<Vec<NotificationView>> {
        let notifications = self.notifications.list_notifications(receiver_id).await?;

        let mut views = Vec::with_capacity(notifications.len());
        for notification in notifications {
            let preview = self.resolve_preview(&notification).await?;
            views.push(NotificationView {
                notification,
                preview,
            });
        }
        Ok(views)
    }

    pub async fn mark_read(&self, id: &str, receiver_id: &str) -> Result<Notification> {
        self.notifications
            .mark_read(id, receiver_id)
            .await?
            .ok_or_else(|| AppError::not_found("Notification"))
    }

    pub async fn unread_count(&self, receiver_id: &str) -> Result<u64> {
        self.notifications.count_unread(receiver_id).await
    }

    // Reply text, else main comment text, else the deleted placeholder.
    // Notifications without a comment reference have no preview.
    async fn resolve_preview(&self, notification: &Notification) -> Result<Option<String>> {
        if notification.related_comment_id.is_none() && notification.related_reply_id.is_none() {
            return Ok(None);
        }

        if let Some(reply_id) = &notification.related_reply_id {
            if let Some(reply) = self.comments.get_reply(reply_id).await? {
                return Ok(Some(reply.text));
            }
        }

        if let Some(comment_id) = &notification.related_comment_id {
            if let Some(comment) = self.comments.get_main(comment_id).await? {
                return Ok(Some(comment.text));
            }
        }

        Ok(Some(DELETED_COMMENT_PLACEHOLDER.to_string()))
    }
}
