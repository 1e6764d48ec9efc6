use crate::{
    config::Config,
    error::{AppError, Result},
    models::{
        comment::*,
        user::UserProfile,
        websocket::FanOutEvent,
    },
    services::{
        channel::FanOutPublisher,
        notification::{NotificationService, ReplyNotice},
        repository::{CommentRepository, Directory},
    },
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Storage engines take signed row offsets.
const MAX_OFFSET: usize = i64::MAX as usize;

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    directory: Arc<dyn Directory>,
    notification_service: NotificationService,
    publisher: Arc<dyn FanOutPublisher>,
    max_comment_length: usize,
}

impl CommentService {
    pub fn new(
        config: &Config,
        comments: Arc<dyn CommentRepository>,
        directory: Arc<dyn Directory>,
        notification_service: NotificationService,
        publisher: Arc<dyn FanOutPublisher>,
    ) -> Self {
        Self {
            comments,
            directory,
            notification_service,
            publisher,
            max_comment_length: config.max_comment_length,
        }
    }

    pub async fn create_main_comment(
        &self,
        blog_id: &str,
        request: CreateMainCommentRequest,
    ) -> Result<MainComment> {
        debug!("Creating main comment on blog: {}", blog_id);

        request.validate()?;
        let author_id = required(request.author_id, "authorId")?;
        let text = self.checked_text(request.text)?;

        let blog = self
            .directory
            .get_blog(blog_id)
            .await?
            .ok_or_else(|| AppError::not_found("Blog"))?;
        let author = self.find_user(&author_id, "Author").await?;

        let comment = MainComment {
            id: Uuid::new_v4().to_string(),
            parent_entity_id: blog.blog_id.clone(),
            author_id: author.user_id,
            author_display_name: author.display_name,
            author_avatar_url: author.avatar_url,
            text,
            created_at: Utc::now(),
            replies: Vec::new(),
        };

        self.comments.insert_main(&comment).await?;
        info!("Main comment {} created on blog {}", comment.id, blog_id);

        // 已提交，通知和推送失败只记录日志
        self.notify(ReplyNotice {
            sender_id: &comment.author_id,
            sender_display_name: &comment.author_display_name,
            receiver_id: &blog.author_id,
            related_entity_id: &blog.blog_id,
            related_main_comment_id: &comment.id,
            related_reply_comment_id: None,
        })
        .await;
        self.publish(&blog.blog_id, FanOutEvent::Main(comment.clone()));

        Ok(comment)
    }

    pub async fn create_reply_comment(
        &self,
        parent_comment_id: &str,
        request: CreateReplyCommentRequest,
    ) -> Result<ReplyComment> {
        debug!("Creating reply under comment: {}", parent_comment_id);

        request.validate()?;
        let sender_id = required(request.sender_id, "senderId")?;
        let receiver_id = required(request.receiver_id, "receiverId")?;
        let text = self.checked_text(request.text)?;

        let parent = self
            .comments
            .get_main(parent_comment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))?;
        let sender = self.find_user(&sender_id, "Sender").await?;
        let recipient = self.find_user(&receiver_id, "Recipient").await?;

        let reply = ReplyComment {
            id: Uuid::new_v4().to_string(),
            parent_comment_id: parent.id.clone(),
            sender_id: sender.user_id,
            sender_display_name: sender.display_name,
            sender_avatar_url: sender.avatar_url,
            recipient_id: recipient.user_id,
            recipient_display_name: recipient.display_name,
            recipient_avatar_url: recipient.avatar_url,
            text,
            created_at: Utc::now(),
        };

        self.comments
            .insert_reply(&parent.parent_entity_id, &reply)
            .await?;
        info!("Reply {} created under comment {}", reply.id, parent.id);

        self.notify(ReplyNotice {
            sender_id: &reply.sender_id,
            sender_display_name: &reply.sender_display_name,
            receiver_id: &reply.recipient_id,
            related_entity_id: &parent.parent_entity_id,
            related_main_comment_id: &parent.id,
            related_reply_comment_id: Some(reply.id.as_str()),
        })
        .await;
        self.publish(&parent.parent_entity_id, FanOutEvent::Reply(reply.clone()));

        Ok(reply)
    }

    /// One page of main comments, newest first, each with its replies
    /// attached oldest first. `total` counts every main comment of the blog.
    pub async fn list_main_comments(
        &self,
        blog_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<CommentPage> {
        debug!("Listing comments for blog {} page {} limit {}", blog_id, page, limit);

        let page = page.max(1);
        let limit = limit.max(1);
        let offset = (page - 1)
            .checked_mul(limit)
            .filter(|offset| *offset <= MAX_OFFSET);
        let (mut comments, total) = match offset {
            Some(offset) => self.comments.list_main(blog_id, offset, limit).await?,
            // 页码超出范围，结果必为空
            None => (Vec::new(), self.comments.count_main(blog_id).await?),
        };

        let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
        let mut replies = self.comments.list_replies(&ids).await?;
        for comment in comments.iter_mut() {
            comment.replies = replies.remove(&comment.id).unwrap_or_default();
        }

        Ok(CommentPage {
            comments,
            pagination: Pagination::new(page, limit, total),
        })
    }

    /// Main comments plus all their replies, independent of paging.
    pub async fn count_all(&self, blog_id: &str) -> Result<u64> {
        let main = self.comments.count_main(blog_id).await?;
        let replies = self.comments.count_replies(blog_id).await?;
        Ok(main + replies)
    }

    pub async fn delete_main_comment(&self, comment_id: &str, requester_id: &str) -> Result<()> {
        let comment = self
            .comments
            .get_main(comment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Comment"))?;

        if comment.author_id != requester_id {
            return Err(AppError::forbidden("You can only delete your own comments"));
        }

        self.comments.delete_main_cascade(comment_id).await?;
        info!("Main comment {} deleted by {}", comment_id, requester_id);
        Ok(())
    }

    pub async fn delete_reply_comment(&self, reply_id: &str, requester_id: &str) -> Result<()> {
        let reply = self
            .comments
            .get_reply(reply_id)
            .await?
            .ok_or_else(|| AppError::not_found("Reply"))?;

        if reply.sender_id != requester_id {
            return Err(AppError::forbidden("You can only delete your own replies"));
        }

        self.comments.delete_reply(reply_id).await?;
        info!("Reply {} deleted by {}", reply_id, requester_id);
        Ok(())
    }

    // Helper methods
    fn checked_text(&self, text: Option<String>) -> Result<String> {
        let text = required(text, "text")?;
        if text.chars().count() > self.max_comment_length {
            return Err(AppError::Validation(format!(
                "text exceeds {} characters",
                self.max_comment_length
            )));
        }
        Ok(text)
    }

    async fn find_user(&self, user_id: &str, role: &str) -> Result<UserProfile> {
        self.directory
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(role))
    }

    async fn notify(&self, notice: ReplyNotice<'_>) {
        if let Err(e) = self.notification_service.record_reply_notification(notice).await {
            warn!("Failed to record notification: {}", e);
        }
    }

    fn publish(&self, room_key: &str, event: FanOutEvent) {
        if let Err(e) = self.publisher.publish(room_key, &event) {
            warn!("Failed to publish {} to room {}: {}", event.comment_id(), room_key, e);
        }
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Blog;
    use crate::services::{channel::MockFanOutPublisher, memory::MemoryStore};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct Fixture {
        store: MemoryStore,
        service: CommentService,
        notifications: NotificationService,
    }

    async fn fixture(publisher: MockFanOutPublisher) -> Fixture {
        let store = MemoryStore::new();
        store.save_user(&UserProfile::new("alice", "Alice")).await.unwrap();
        store.save_user(&UserProfile::new("bob", "Bob")).await.unwrap();
        store.save_user(&UserProfile::new("xavier", "Xavier")).await.unwrap();
        store.save_blog(&Blog::new("blog-1", "alice", "Rust notes")).await.unwrap();

        let notifications =
            NotificationService::new(Arc::new(store.clone()), Arc::new(store.clone()));
        let service = CommentService::new(
            &Config::default(),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            notifications.clone(),
            Arc::new(publisher),
        );

        Fixture {
            store,
            service,
            notifications,
        }
    }

    /// Deletes the parent thread between the service's parent lookup and the
    /// reply write.
    struct DeleteDuringReply {
        store: MemoryStore,
    }

    #[async_trait]
    impl CommentRepository for DeleteDuringReply {
        async fn insert_main(&self, comment: &MainComment) -> Result<()> {
            self.store.insert_main(comment).await
        }

        async fn insert_reply(&self, blog_id: &str, reply: &ReplyComment) -> Result<()> {
            self.store.delete_main_cascade(&reply.parent_comment_id).await?;
            self.store.insert_reply(blog_id, reply).await
        }

        async fn get_main(&self, id: &str) -> Result<Option<MainComment>> {
            self.store.get_main(id).await
        }

        async fn get_reply(&self, id: &str) -> Result<Option<ReplyComment>> {
            self.store.get_reply(id).await
        }

        async fn list_main(
            &self,
            blog_id: &str,
            offset: usize,
            limit: usize,
        ) -> Result<(Vec<MainComment>, u64)> {
            self.store.list_main(blog_id, offset, limit).await
        }

        async fn list_replies(
            &self,
            main_ids: &[String],
        ) -> Result<HashMap<String, Vec<ReplyComment>>> {
            self.store.list_replies(main_ids).await
        }

        async fn count_main(&self, blog_id: &str) -> Result<u64> {
            self.store.count_main(blog_id).await
        }

        async fn count_replies(&self, blog_id: &str) -> Result<u64> {
            self.store.count_replies(blog_id).await
        }

        async fn delete_main_cascade(&self, id: &str) -> Result<()> {
            self.store.delete_main_cascade(id).await
        }

        async fn delete_reply(&self, id: &str) -> Result<()> {
            self.store.delete_reply(id).await
        }
    }

    fn quiet_publisher() -> MockFanOutPublisher {
        let mut publisher = MockFanOutPublisher::new();
        publisher.expect_publish().returning(|_, _| Ok(1));
        publisher
    }

    fn main_request(author: &str, text: &str) -> CreateMainCommentRequest {
        CreateMainCommentRequest {
            author_id: Some(author.to_string()),
            text: Some(text.to_string()),
        }
    }

    fn reply_request(sender: &str, receiver: &str, text: &str) -> CreateReplyCommentRequest {
        CreateReplyCommentRequest {
            sender_id: Some(sender.to_string()),
            receiver_id: Some(receiver.to_string()),
            text: Some(text.to_string()),
        }
    }

    #[tokio::test]
    async fn test_comment_reply_delete_scenario() {
        let f = fixture(quiet_publisher()).await;

        let c1 = f
            .service
            .create_main_comment("blog-1", main_request("alice", "first!"))
            .await
            .unwrap();
        let page = f.service.list_main_comments("blog-1", 1, 10).await.unwrap();
        assert_eq!(page.pagination.total, 1);

        f.service
            .create_reply_comment(&c1.id, reply_request("xavier", "alice", "welcome"))
            .await
            .unwrap();
        assert_eq!(f.service.count_all("blog-1").await.unwrap(), 2);

        f.service.delete_main_comment(&c1.id, "alice").await.unwrap();
        assert_eq!(f.service.count_all("blog-1").await.unwrap(), 0);
        assert!(f
            .store
            .list_replies(&[c1.id.clone()])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reply_racing_parent_delete_leaves_nothing() {
        let f = fixture(quiet_publisher()).await;
        let racing = CommentService::new(
            &Config::default(),
            Arc::new(DeleteDuringReply {
                store: f.store.clone(),
            }),
            Arc::new(f.store.clone()),
            f.notifications.clone(),
            Arc::new(quiet_publisher()),
        );

        let c1 = racing
            .create_main_comment("blog-1", main_request("bob", "soon gone"))
            .await
            .unwrap();
        let result = racing
            .create_reply_comment(&c1.id, reply_request("xavier", "bob", "too late"))
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(f.store.get_main(&c1.id).await.unwrap().is_none());
        assert_eq!(racing.count_all("blog-1").await.unwrap(), 0);
        assert!(f.notifications.list_notifications("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_page_far_past_the_end_is_empty() {
        let f = fixture(quiet_publisher()).await;
        f.service
            .create_main_comment("blog-1", main_request("bob", "only one"))
            .await
            .unwrap();

        for (page, limit) in [(usize::MAX, 10), (usize::MAX / 2, 100), (2, usize::MAX)] {
            let result = f.service.list_main_comments("blog-1", page, limit).await.unwrap();
            assert!(result.comments.is_empty());
            assert_eq!(result.pagination.total, 1);
            assert_eq!(result.pagination.page, page);
        }
    }

    #[tokio::test]
    async fn test_create_publishes_to_blog_room() {
        let mut publisher = MockFanOutPublisher::new();
        publisher
            .expect_publish()
            .withf(|room, event| room.to_string() == "blog-1" && matches!(event, FanOutEvent::Main(_)))
            .times(1)
            .returning(|_, _| Ok(3));
        let f = fixture(publisher).await;

        f.service
            .create_main_comment("blog-1", main_request("bob", "hello"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_write() {
        let mut publisher = MockFanOutPublisher::new();
        publisher
            .expect_publish()
            .returning(|_, _| Err(AppError::ChannelUnavailable("down".to_string())));
        let f = fixture(publisher).await;

        let comment = f
            .service
            .create_main_comment("blog-1", main_request("bob", "still saved"))
            .await
            .unwrap();
        assert!(f.store.get_main(&comment.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_references_are_not_found() {
        let f = fixture(quiet_publisher()).await;

        assert!(matches!(
            f.service
                .create_main_comment("no-such-blog", main_request("bob", "hi"))
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service
                .create_main_comment("blog-1", main_request("ghost", "hi"))
                .await,
            Err(AppError::NotFound(_))
        ));

        let c1 = f
            .service
            .create_main_comment("blog-1", main_request("bob", "hi"))
            .await
            .unwrap();
        assert!(matches!(
            f.service
                .create_reply_comment("missing", reply_request("bob", "alice", "x"))
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service
                .create_reply_comment(&c1.id, reply_request("bob", "ghost", "x"))
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_text_is_rejected() {
        let f = fixture(quiet_publisher()).await;

        let result = f
            .service
            .create_main_comment("blog-1", main_request("bob", "   "))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let missing = CreateMainCommentRequest {
            author_id: Some("bob".to_string()),
            text: None,
        };
        assert!(f.service.create_main_comment("blog-1", missing).await.is_err());
    }

    #[tokio::test]
    async fn test_only_author_may_delete() {
        let f = fixture(quiet_publisher()).await;
        let c1 = f
            .service
            .create_main_comment("blog-1", main_request("bob", "mine"))
            .await
            .unwrap();
        let r1 = f
            .service
            .create_reply_comment(&c1.id, reply_request("xavier", "bob", "reply"))
            .await
            .unwrap();

        for requester in ["alice", "xavier", ""] {
            assert!(matches!(
                f.service.delete_main_comment(&c1.id, requester).await,
                Err(AppError::Authorization(_))
            ));
        }
        assert!(matches!(
            f.service.delete_reply_comment(&r1.id, "bob").await,
            Err(AppError::Authorization(_))
        ));

        f.service.delete_reply_comment(&r1.id, "xavier").await.unwrap();
        f.service.delete_main_comment(&c1.id, "bob").await.unwrap();
        assert!(matches!(
            f.service.delete_main_comment(&c1.id, "bob").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_notifications_go_to_the_right_receiver() {
        let f = fixture(quiet_publisher()).await;

        // Blog author commenting on their own blog: no notification.
        let own = f
            .service
            .create_main_comment("blog-1", main_request("alice", "own post"))
            .await
            .unwrap();
        assert!(f.notifications.list_notifications("alice").await.unwrap().is_empty());

        f.service
            .create_main_comment("blog-1", main_request("bob", "nice"))
            .await
            .unwrap();
        assert_eq!(f.notifications.list_notifications("alice").await.unwrap().len(), 1);

        // Reply addressed to bob on alice's comment notifies bob, not alice.
        f.service
            .create_reply_comment(&own.id, reply_request("xavier", "bob", "@bob agreed"))
            .await
            .unwrap();
        let bob = f.notifications.list_notifications("bob").await.unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].preview.as_deref(), Some("@bob agreed"));
        assert_eq!(f.notifications.list_notifications("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pages_attach_replies_and_keep_total() {
        let f = fixture(quiet_publisher()).await;
        let mut ids = Vec::new();
        for i in 0..5 {
            let c = f
                .service
                .create_main_comment("blog-1", main_request("bob", &format!("c{}", i)))
                .await
                .unwrap();
            ids.push(c.id);
        }
        f.service
            .create_reply_comment(&ids[4], reply_request("alice", "bob", "r"))
            .await
            .unwrap();

        for (page, expected_len) in [(1, 2), (2, 2), (3, 1), (4, 0)] {
            let result = f.service.list_main_comments("blog-1", page, 2).await.unwrap();
            assert_eq!(result.pagination.total, 5);
            assert_eq!(result.pagination.total_pages, 3);
            assert_eq!(result.comments.len(), expected_len);
        }

        let first = f.service.list_main_comments("blog-1", 1, 10).await.unwrap();
        let with_reply = first.comments.iter().find(|c| c.id == ids[4]).unwrap();
        assert_eq!(with_reply.replies.len(), 1);
    }
}
