use crate::{
    error::{AppError, Result},
    models::{comment::*, response::ApiResponse},
    services::auth::User,
    state::AppState,
    utils::middleware::{rate_limit_middleware, AuthUser, OptionalAuth},
};
use axum::{
    extract::{Path, Query, State},
    middleware,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // 写接口经过限流
    let writes = Router::new()
        .route("/:blog_id/main", post(create_main_comment))
        .route("/main/:comment_id/reply", post(create_reply_comment))
        .route("/main/:comment_id", delete(delete_main_comment))
        .route("/reply/:reply_id", delete(delete_reply_comment))
        .route_layer(middleware::from_fn_with_state(state, rate_limit_middleware));

    Router::new()
        .route("/:blog_id", get(list_comments))
        .route("/:blog_id/count", get(count_comments))
        .merge(writes)
}

async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(blog_id): Path<String>,
    Query(query): Query<CommentListQuery>,
) -> Result<Json<ApiResponse<CommentPage>>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = state.get_page_size(query.limit);

    let comments = state
        .comment_service
        .list_main_comments(&blog_id, page, limit)
        .await?;

    Ok(Json(ApiResponse::success(comments)))
}

async fn count_comments(
    State(state): State<Arc<AppState>>,
    Path(blog_id): Path<String>,
) -> Result<Json<ApiResponse<CommentCount>>> {
    let count = state.comment_service.count_all(&blog_id).await?;
    Ok(Json(ApiResponse::success(CommentCount { count })))
}

async fn create_main_comment(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(blog_id): Path<String>,
    Json(request): Json<CreateMainCommentRequest>,
) -> Result<Json<ApiResponse<MainComment>>> {
    ensure_same_identity(user.as_ref(), request.author_id.as_deref())?;

    let comment = state
        .comment_service
        .create_main_comment(&blog_id, request)
        .await?;

    Ok(Json(ApiResponse::success(comment)))
}

async fn create_reply_comment(
    State(state): State<Arc<AppState>>,
    OptionalAuth(user): OptionalAuth,
    Path(comment_id): Path<String>,
    Json(request): Json<CreateReplyCommentRequest>,
) -> Result<Json<ApiResponse<ReplyComment>>> {
    ensure_same_identity(user.as_ref(), request.sender_id.as_deref())?;

    let reply = state
        .comment_service
        .create_reply_comment(&comment_id, request)
        .await?;

    Ok(Json(ApiResponse::success(reply)))
}

async fn delete_main_comment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(comment_id): Path<String>,
) -> Result<Json<Value>> {
    state
        .comment_service
        .delete_main_comment(&comment_id, &user.id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Comment deleted successfully"
    })))
}

async fn delete_reply_comment(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(reply_id): Path<String>,
) -> Result<Json<Value>> {
    state
        .comment_service
        .delete_reply_comment(&reply_id, &user.id)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Reply deleted successfully"
    })))
}

/// A signed-in caller may only write as themselves.
fn ensure_same_identity(user: Option<&User>, claimed: Option<&str>) -> Result<()> {
    match (user, claimed) {
        (Some(user), Some(claimed)) if user.id != claimed => {
            debug!("Token user {} tried to write as {}", user.id, claimed);
            Err(AppError::forbidden("Cannot write on behalf of another user"))
        }
        _ => Ok(()),
    }
}
