use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use validator::Validate;

/// A top-level comment on a blog. `replies` is filled per comment when a
/// page is listed, and is empty on freshly created comments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainComment {
    pub id: String,
    pub parent_entity_id: String,
    pub author_id: String,
    pub author_display_name: String,
    pub author_avatar_url: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub replies: Vec<ReplyComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyComment {
    pub id: String,
    pub parent_comment_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub sender_avatar_url: Option<String>,
    pub recipient_id: String,
    pub recipient_display_name: String,
    pub recipient_avatar_url: Option<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMainCommentRequest {
    #[validate(required, length(min = 1, message = "authorId is required"))]
    pub author_id: Option<String>,
    #[validate(required, length(min = 1, message = "text is required"))]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReplyCommentRequest {
    #[validate(required, length(min = 1, message = "senderId is required"))]
    pub sender_id: Option<String>,
    #[validate(required, length(min = 1, message = "receiverId is required"))]
    pub receiver_id: Option<String>,
    #[validate(required, length(min = 1, message = "text is required"))]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: u64,
    pub total_pages: u64,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: u64) -> Self {
        let limit = limit.max(1);
        Self {
            page,
            limit,
            total,
            total_pages: total / limit as u64 + u64::from(total % limit as u64 != 0),
        }
    }
}

/// One page of main comments as served by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPage {
    pub comments: Vec<MainComment>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentCount {
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_total_pages() {
        assert_eq!(Pagination::new(1, 10, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).total_pages, 1);
        assert_eq!(Pagination::new(2, 10, 11).total_pages, 2);
        assert_eq!(Pagination::new(1, usize::MAX, 5).total_pages, 1);
    }

    #[test]
    fn test_missing_fields_fail_validation() {
        let request = CreateMainCommentRequest {
            author_id: None,
            text: Some("hi".to_string()),
        };
        assert!(request.validate().is_err());

        let blank = CreateReplyCommentRequest {
            sender_id: Some("a".to_string()),
            receiver_id: Some("b".to_string()),
            text: Some(String::new()),
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_wire_names_are_camel_case() {
        let value = serde_json::to_value(Pagination::new(1, 10, 3)).unwrap();
        assert_eq!(value["totalPages"], 1);
    }
}
