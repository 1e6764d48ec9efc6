pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{state::AppState, utils::middleware::{auth_middleware, request_logging_middleware}};

/// Builds the HTTP and websocket surface over a wired `AppState`.
pub fn app(app_state: Arc<AppState>) -> Router {
    // 配置 CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .allow_origin(
            app_state
                .config
                .cors_allowed_origins
                .split(',')
                .filter_map(|origin| origin.trim().parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        );

    // 使用/api/blog/前缀避免网关路由冲突
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest("/api/blog/comments", routes::comments::router(app_state.clone()))
        .nest("/api/blog/notifications", routes::notifications::router())
        .nest("/api/blog/channel", routes::websocket::router())
        .layer(middleware::from_fn_with_state(app_state.clone(), auth_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health_check() -> &'static str {
    "comment-sync is running!"
}
