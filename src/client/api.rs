use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::{
    error::{AppError, Result},
    models::{
        comment::{
            CommentPage, CreateMainCommentRequest, CreateReplyCommentRequest, MainComment,
            ReplyComment,
        },
        response::{ApiResponse, ErrorResponse},
    },
};

/// The comment endpoints a viewer needs.
#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn list_main_comments(&self, blog_id: &str, page: usize, limit: usize)
        -> Result<CommentPage>;

    async fn create_main_comment(
        &self,
        blog_id: &str,
        request: &CreateMainCommentRequest,
    ) -> Result<MainComment>;

    async fn create_reply_comment(
        &self,
        parent_comment_id: &str,
        request: &CreateReplyCommentRequest,
    ) -> Result<ReplyComment>;
}

/// `CommentApi` over the REST surface.
#[derive(Clone)]
pub struct HttpCommentApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpCommentApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::BadRequest(format!("Invalid API base URL {}: {}", base_url, e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            token: None,
        })
    }

    /// Sends `token` as a bearer on every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::internal("API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(["api", "blog", "comments"])
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| AppError::TransientIo(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            let envelope: ApiResponse<T> = response
                .json()
                .await
                .map_err(|e| AppError::TransientIo(format!("Malformed response: {}", e)))?;
            return Ok(envelope.data);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => status.to_string(),
        };
        debug!("Comment API answered {}: {}", status, message);
        Err(error_for_status(status, message))
    }
}

fn error_for_status(status: StatusCode, message: String) -> AppError {
    match status {
        StatusCode::BAD_REQUEST => AppError::Validation(message),
        StatusCode::UNAUTHORIZED => AppError::Authentication(message),
        StatusCode::FORBIDDEN => AppError::Authorization(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimitExceeded,
        _ => {
            warn!("Unexpected status {} from comment API", status);
            AppError::TransientIo(message)
        }
    }
}

#[async_trait]
impl CommentApi for HttpCommentApi {
    async fn list_main_comments(
        &self,
        blog_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<CommentPage> {
        let url = self.endpoint(&[blog_id])?;
        self.send(self.client.get(url).query(&[("page", page), ("limit", limit)]))
            .await
    }

    async fn create_main_comment(
        &self,
        blog_id: &str,
        request: &CreateMainCommentRequest,
    ) -> Result<MainComment> {
        let url = self.endpoint(&[blog_id, "main"])?;
        self.send(self.client.post(url).json(request)).await
    }

    async fn create_reply_comment(
        &self,
        parent_comment_id: &str,
        request: &CreateReplyCommentRequest,
    ) -> Result<ReplyComment> {
        let url = self.endpoint(&["main", parent_comment_id, "reply"])?;
        self.send(self.client.post(url).json(request)).await
    }
}
