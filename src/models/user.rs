use serde::{Deserialize, Serialize};

/// Identity snapshot source for comment authors, senders and recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: &str, display_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            avatar_url: None,
        }
    }
}

/// The entity a comment thread hangs off; its author receives top-level
/// comment notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blog {
    pub blog_id: String,
    pub author_id: String,
    pub title: String,
}

impl Blog {
    pub fn new(blog_id: &str, author_id: &str, title: &str) -> Self {
        Self {
            blog_id: blog_id.to_string(),
            author_id: author_id.to_string(),
            title: title.to_string(),
        }
    }
}
