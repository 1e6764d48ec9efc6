use crate::{error::AppError, services::auth::User, state::AppState};
use axum::{
    body::Body,
    extract::State,
    headers::{authorization::Bearer, Authorization, HeaderMapExt},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};
use async_trait::async_trait;
use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use std::{num::NonZeroU32, sync::Arc};
use tracing::{debug, info, warn};

type KeyedRateLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// 写接口限流器，按客户端地址计数
pub struct WriteRateLimiter {
    limiter: KeyedRateLimiter,
}

impl WriteRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::dashmap(Quota::per_minute(per_minute)),
        }
    }

    pub fn check(&self, client_key: &str) -> Result<(), AppError> {
        self.limiter
            .check_key(&client_key.to_string())
            .map_err(|_| AppError::RateLimitExceeded)
    }
}

/// 认证中间件
///
/// A valid bearer token puts its `User` into the request extensions. Missing
/// or invalid tokens leave the request anonymous; handlers decide whether
/// that is acceptable.
pub async fn auth_middleware(
    State(app_state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next<Body>,
) -> Response {
    if let Some(Authorization(bearer)) = request.headers().typed_get::<Authorization<Bearer>>() {
        match app_state.auth_service.authenticate(bearer.token()) {
            Ok(user) => {
                debug!("Authenticated user: {}", user.id);
                request.extensions_mut().insert(user);
            }
            Err(e) => {
                // 不返回错误，让请求继续处理（作为未认证请求）
                debug!("JWT verification failed: {}", e);
            }
        }
    }

    next.run(request).await
}

/// 速率限制中间件
pub async fn rate_limit_middleware(
    State(app_state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next<Body>,
) -> Result<Response, AppError> {
    let client_key = get_client_key(&request);

    match app_state.rate_limiter.check(&client_key) {
        Ok(()) => {
            debug!("Rate limit check passed for: {}", client_key);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!("Rate limit exceeded for: {}", client_key);
            Err(e)
        }
    }
}

/// 请求日志中间件
pub async fn request_logging_middleware(request: Request<Body>, next: Next<Body>) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_key = get_client_key(&request);

    let start_time = std::time::Instant::now();

    debug!("Incoming request: {} {} from {}", method, uri, client_key);

    let response = next.run(request).await;

    info!(
        "Request completed: {} {} {} - {}ms",
        method,
        uri,
        response.status().as_u16(),
        start_time.elapsed().as_millis()
    );

    response
}

/// 获取客户端标识，取代理头中的第一个地址
fn get_client_key(request: &Request<Body>) -> String {
    let headers = request.headers();

    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(ip_str) = forwarded_for.to_str() {
            if let Some(ip) = ip_str.split(',').next().map(str::trim) {
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    "anonymous".to_string()
}

/// 可选认证提取器
pub struct OptionalAuth(pub Option<User>);

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(parts.extensions.get::<User>().cloned()))
    }
}

/// 必须认证的提取器
pub struct AuthUser(pub User);

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<User>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
