use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// Shown in place of a comment that no longer exists.
pub const DELETED_COMMENT_PLACEHOLDER: &str = "This comment has been deleted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Reply,
    Follow,
    NewBlog,
}

/// Durable notification. Only `is_read` ever changes after creation, and the
/// record outlives the comment it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub sender_id: String,
    pub receiver_id: String,
    pub related_entity_id: String,
    pub related_comment_id: Option<String>,
    pub related_reply_id: Option<String>,
    pub is_read: bool,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A notification as listed to its receiver, with the comment preview
/// resolved at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread: u64,
}
