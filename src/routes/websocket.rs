use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tracing::info;

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(websocket_handler))
}

/// WebSocket连接处理器
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let connection_id = format!("conn_{}", uuid::Uuid::new_v4());

    info!("WebSocket upgrade request for connection: {}", connection_id);

    let service = state.websocket_service.clone();
    ws.on_upgrade(move |socket| async move {
        service.handle_connection(socket, connection_id).await;
    })
}
