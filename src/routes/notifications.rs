use crate::{
    error::Result,
    models::{
        notification::{Notification, NotificationView, UnreadCount},
        response::ApiResponse,
    },
    state::AppState,
    utils::middleware::AuthUser,
};
use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, put},
    Router,
};
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/:id/read", put(mark_read))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<Vec<NotificationView>>>> {
    let notifications = state
        .notification_service
        .list_notifications(&user.id)
        .await?;

    Ok(Json(ApiResponse::success(notifications)))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> Result<Json<ApiResponse<UnreadCount>>> {
    let unread = state.notification_service.unread_count(&user.id).await?;
    Ok(Json(ApiResponse::success(UnreadCount { unread })))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Notification>>> {
    let notification = state.notification_service.mark_read(&id, &user.id).await?;
    Ok(Json(ApiResponse::success(notification)))
}
