use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use surrealdb::{
    engine::any::{self, Any},
    opt::auth::Root,
    Response, Surreal,
};
use tracing::{debug, error, info};

use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        comment::{MainComment, ReplyComment},
        notification::{Notification, NotificationType},
        user::{Blog, UserProfile},
    },
    services::repository::{CommentRepository, Directory, NotificationRepository},
};

/// 数据库服务
///
/// Rows keep their own string id column next to the engine's record id, and
/// order by an integer microsecond timestamp.
#[derive(Clone)]
pub struct Database {
    client: Surreal<Any>,
}

impl Database {
    /// 创建新的数据库实例
    pub async fn new(config: &Config) -> Result<Self> {
        info!("Initializing database connection to {}", config.database_url);

        let client = any::connect(config.database_url.as_str()).await?;

        if !config.database_url.starts_with("mem://") {
            client
                .signin(Root {
                    username: &config.database_username,
                    password: &config.database_password,
                })
                .await?;
        }

        client
            .use_ns(config.database_namespace.as_str())
            .use_db(config.database_name.as_str())
            .await?;

        Ok(Self { client })
    }

    /// 验证数据库连接
    pub async fn verify_connection(&self) -> Result<()> {
        match self.client.query("INFO FOR DB").await {
            Ok(response) => {
                response.check()?;
                info!("Database connection verified successfully");
                Ok(())
            }
            Err(e) => {
                error!("Failed to verify database connection: {}", e);
                Err(AppError::from(e))
            }
        }
    }

    /// 执行带参数的查询
    pub async fn query_with_params<P>(&self, sql: &str, params: P) -> Result<Response>
    where
        P: Serialize,
    {
        debug!("Executing query: {}", sql);
        let response = self.client.query(sql).bind(params).await?;
        Ok(response.check()?)
    }

    async fn count(&self, sql: &str, params: serde_json::Value) -> Result<u64> {
        let mut response = self.query_with_params(sql, params).await?;
        let row: Option<CountRow> = response.take(0)?;
        Ok(row.map(|r| r.total).unwrap_or(0))
    }
}

fn to_micros(at: &DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| AppError::internal("Stored timestamp out of range"))
}

#[derive(Debug, Deserialize)]
struct CountRow {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct CreatedRow {
    comment_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct MainCommentRow {
    comment_id: String,
    blog_id: String,
    author_id: String,
    author_display_name: String,
    author_avatar_url: Option<String>,
    text: String,
    created_at_us: i64,
}

impl MainCommentRow {
    fn from_model(comment: &MainComment) -> Self {
        Self {
            comment_id: comment.id.clone(),
            blog_id: comment.parent_entity_id.clone(),
            author_id: comment.author_id.clone(),
            author_display_name: comment.author_display_name.clone(),
            author_avatar_url: comment.author_avatar_url.clone(),
            text: comment.text.clone(),
            created_at_us: to_micros(&comment.created_at),
        }
    }

    fn into_model(self) -> Result<MainComment> {
        Ok(MainComment {
            id: self.comment_id,
            parent_entity_id: self.blog_id,
            author_id: self.author_id,
            author_display_name: self.author_display_name,
            author_avatar_url: self.author_avatar_url,
            text: self.text,
            created_at: from_micros(self.created_at_us)?,
            replies: Vec::new(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ReplyCommentRow {
    comment_id: String,
    blog_id: String,
    parent_comment_id: String,
    sender_id: String,
    sender_display_name: String,
    sender_avatar_url: Option<String>,
    recipient_id: String,
    recipient_display_name: String,
    recipient_avatar_url: Option<String>,
    text: String,
    created_at_us: i64,
}

impl ReplyCommentRow {
    fn from_model(blog_id: &str, reply: &ReplyComment) -> Self {
        Self {
            comment_id: reply.id.clone(),
            blog_id: blog_id.to_string(),
            parent_comment_id: reply.parent_comment_id.clone(),
            sender_id: reply.sender_id.clone(),
            sender_display_name: reply.sender_display_name.clone(),
            sender_avatar_url: reply.sender_avatar_url.clone(),
            recipient_id: reply.recipient_id.clone(),
            recipient_display_name: reply.recipient_display_name.clone(),
            recipient_avatar_url: reply.recipient_avatar_url.clone(),
            text: reply.text.clone(),
            created_at_us: to_micros(&reply.created_at),
        }
    }

    fn into_model(self) -> Result<ReplyComment> {
        Ok(ReplyComment {
            id: self.comment_id,
            parent_comment_id: self.parent_comment_id,
            sender_id: self.sender_id,
            sender_display_name: self.sender_display_name,
            sender_avatar_url: self.sender_avatar_url,
            recipient_id: self.recipient_id,
            recipient_display_name: self.recipient_display_name,
            recipient_avatar_url: self.recipient_avatar_url,
            text: self.text,
            created_at: from_micros(self.created_at_us)?,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct NotificationRow {
    notification_id: String,
    notification_type: NotificationType,
    sender_id: String,
    receiver_id: String,
    related_entity_id: String,
    related_comment_id: Option<String>,
    related_reply_id: Option<String>,
    is_read: bool,
    message: String,
    created_at_us: i64,
}

impl NotificationRow {
    fn from_model(notification: &Notification) -> Self {
        Self {
            notification_id: notification.id.clone(),
            notification_type: notification.notification_type,
            sender_id: notification.sender_id.clone(),
            receiver_id: notification.receiver_id.clone(),
            related_entity_id: notification.related_entity_id.clone(),
            related_comment_id: notification.related_comment_id.clone(),
            related_reply_id: notification.related_reply_id.clone(),
            is_read: notification.is_read,
            message: notification.message.clone(),
            created_at_us: to_micros(&notification.created_at),
        }
    }

    fn into_model(self) -> Result<Notification> {
        Ok(Notification {
            id: self.notification_id,
            notification_type: self.notification_type,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            related_entity_id: self.related_entity_id,
            related_comment_id: self.related_comment_id,
            related_reply_id: self.related_reply_id,
            is_read: self.is_read,
            message: self.message,
            created_at: from_micros(self.created_at_us)?,
        })
    }
}

#[async_trait]
impl CommentRepository for Database {
    async fn insert_main(&self, comment: &MainComment) -> Result<()> {
        self.query_with_params(
            "CREATE main_comment CONTENT $row",
            json!({ "row": MainCommentRow::from_model(comment) }),
        )
        .await?;
        Ok(())
    }

    async fn insert_reply(&self, blog_id: &str, reply: &ReplyComment) -> Result<()> {
        // 单条语句在同一事务内检查父评论并写入
        let query = r#"
            IF array::len((SELECT comment_id FROM main_comment WHERE comment_id = $parent_id)) > 0 THEN
                (CREATE reply_comment CONTENT $row RETURN comment_id)
            ELSE
                []
            END
        "#;
        let mut response = self
            .query_with_params(
                query,
                json!({
                    "parent_id": reply.parent_comment_id,
                    "row": ReplyCommentRow::from_model(blog_id, reply),
                }),
            )
            .await?;
        let created: Vec<CreatedRow> = response.take(0)?;
        match created.first() {
            Some(row) => {
                debug!("Stored reply {} under {}", row.comment_id, reply.parent_comment_id);
                Ok(())
            }
            None => Err(AppError::not_found("Comment")),
        }
    }

    async fn get_main(&self, id: &str) -> Result<Option<MainComment>> {
        let mut response = self
            .query_with_params(
                "SELECT * FROM main_comment WHERE comment_id = $id",
                json!({ "id": id }),
            )
            .await?;
        let rows: Vec<MainCommentRow> = response.take(0)?;
        rows.into_iter().next().map(MainCommentRow::into_model).transpose()
    }

    async fn get_reply(&self, id: &str) -> Result<Option<ReplyComment>> {
        let mut response = self
            .query_with_params(
                "SELECT * FROM reply_comment WHERE comment_id = $id",
                json!({ "id": id }),
            )
            .await?;
        let rows: Vec<ReplyCommentRow> = response.take(0)?;
        rows.into_iter().next().map(ReplyCommentRow::into_model).transpose()
    }

    async fn list_main(
        &self,
        blog_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<MainComment>, u64)> {
        let query = format!(
            r#"
                SELECT * FROM main_comment
                WHERE blog_id = $blog_id
                ORDER BY created_at_us DESC, comment_id DESC
                LIMIT {} START {}
            "#,
            limit, offset
        );
        let mut response = self
            .query_with_params(&query, json!({ "blog_id": blog_id }))
            .await?;
        let rows: Vec<MainCommentRow> = response.take(0)?;
        let comments = rows
            .into_iter()
            .map(MainCommentRow::into_model)
            .collect::<Result<Vec<_>>>()?;

        let total = self.count_main(blog_id).await?;
        Ok((comments, total))
    }

    async fn list_replies(
        &self,
        main_ids: &[String],
    ) -> Result<HashMap<String, Vec<ReplyComment>>> {
        if main_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let query = r#"
            SELECT * FROM reply_comment
            WHERE parent_comment_id INSIDE $ids
            ORDER BY created_at_us ASC, comment_id ASC
        "#;
        let mut response = self
            .query_with_params(query, json!({ "ids": main_ids }))
            .await?;
        let rows: Vec<ReplyCommentRow> = response.take(0)?;

        let mut grouped: HashMap<String, Vec<ReplyComment>> = HashMap::new();
        for row in rows {
            let reply = row.into_model()?;
            grouped
                .entry(reply.parent_comment_id.clone())
                .or_default()
                .push(reply);
        }
        Ok(grouped)
    }

    async fn count_main(&self, blog_id: &str) -> Result<u64> {
        self.count(
            "SELECT count() AS total FROM main_comment WHERE blog_id = $blog_id GROUP ALL",
            json!({ "blog_id": blog_id }),
        )
        .await
    }

    async fn count_replies(&self, blog_id: &str) -> Result<u64> {
        self.count(
            "SELECT count() AS total FROM reply_comment WHERE blog_id = $blog_id GROUP ALL",
            json!({ "blog_id": blog_id }),
        )
        .await
    }

    async fn delete_main_cascade(&self, id: &str) -> Result<()> {
        let query = r#"
            BEGIN TRANSACTION;
            DELETE reply_comment WHERE parent_comment_id = $id;
            DELETE main_comment WHERE comment_id = $id;
            COMMIT TRANSACTION;
        "#;
        self.query_with_params(query, json!({ "id": id })).await?;
        Ok(())
    }

    async fn delete_reply(&self, id: &str) -> Result<()> {
        self.query_with_params(
            "DELETE reply_comment WHERE comment_id = $id",
            json!({ "id": id }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Directory for Database {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let mut response = self
            .query_with_params(
                "SELECT user_id, display_name, avatar_url FROM user_profile WHERE user_id = $user_id",
                json!({ "user_id": user_id }),
            )
            .await?;
        let rows: Vec<UserProfile> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn get_blog(&self, blog_id: &str) -> Result<Option<Blog>> {
        let mut response = self
            .query_with_params(
                "SELECT blog_id, author_id, title FROM blog WHERE blog_id = $blog_id",
                json!({ "blog_id": blog_id }),
            )
            .await?;
        let rows: Vec<Blog> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn save_user(&self, user: &UserProfile) -> Result<()> {
        let query = r#"
            BEGIN TRANSACTION;
            DELETE user_profile WHERE user_id = $row.user_id;
            CREATE user_profile CONTENT $row;
            COMMIT TRANSACTION;
        "#;
        self.query_with_params(query, json!({ "row": user })).await?;
        Ok(())
    }

    async fn save_blog(&self, blog: &Blog) -> Result<()> {
        let query = r#"
            BEGIN TRANSACTION;
            DELETE blog WHERE blog_id = $row.blog_id;
            CREATE blog CONTENT $row;
            COMMIT TRANSACTION;
        "#;
        self.query_with_params(query, json!({ "row": blog })).await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository for Database {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.query_with_params(
            "CREATE notification CONTENT $row",
            json!({ "row": NotificationRow::from_model(notification) }),
        )
        .await?;
        Ok(())
    }

    async fn list_notifications(&self, receiver_id: &str) -> Result<Vec<Notification>> {
        let query = r#"
            SELECT * FROM notification
            WHERE receiver_id = $receiver_id
            ORDER BY created_at_us DESC
        "#;
        let mut response = self
            .query_with_params(query, json!({ "receiver_id": receiver_id }))
            .await?;
        let rows: Vec<NotificationRow> = response.take(0)?;
        rows.into_iter().map(NotificationRow::into_model).collect()
    }

    async fn mark_read(&self, id: &str, receiver_id: &str) -> Result<Option<Notification>> {
        let query = r#"
            UPDATE notification SET is_read = true
            WHERE notification_id = $id AND receiver_id = $receiver_id
            RETURN AFTER
        "#;
        let mut response = self
            .query_with_params(query, json!({ "id": id, "receiver_id": receiver_id }))
            .await?;
        let rows: Vec<NotificationRow> = response.take(0)?;
        rows.into_iter().next().map(NotificationRow::into_model).transpose()
    }

    async fn count_unread(&self, receiver_id: &str) -> Result<u64> {
        self.count(
            r#"
                SELECT count() AS total FROM notification
                WHERE receiver_id = $receiver_id AND is_read = false
                GROUP ALL
            "#,
            json!({ "receiver_id": receiver_id }),
        )
        .await
    }
}
