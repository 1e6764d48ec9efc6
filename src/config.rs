use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

const DEV_JWT_SECRET: &str = "comment-sync-dev-secret";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub server_host: String,
    pub server_port: u16,
    pub environment: String,
    pub log_level: String,

    // Database configuration
    pub database_url: String,
    pub database_namespace: String,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,

    // Authentication configuration
    pub jwt_secret: String,

    // Content settings
    pub max_comment_length: usize,
    pub default_comments_per_page: usize,
    pub max_comments_per_page: usize,

    // Rate limiting
    pub rate_limit_requests: u32,

    // CORS configuration
    pub cors_allowed_origins: String,

    // Sync client
    pub api_base_url: String,
    pub channel_url: String,
    pub poll_interval_secs: u64,
    pub channel_reconnect_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) => secret,
            Err(_) => {
                tracing::warn!("JWT_SECRET not set, falling back to the development secret");
                defaults.jwt_secret.clone()
            }
        };

        Ok(Config {
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            database_namespace: env::var("DATABASE_NAMESPACE")
                .unwrap_or(defaults.database_namespace),
            database_name: env::var("DATABASE_NAME").unwrap_or(defaults.database_name),
            database_username: env::var("DATABASE_USERNAME")
                .unwrap_or(defaults.database_username),
            database_password: env::var("DATABASE_PASSWORD")
                .unwrap_or(defaults.database_password),

            jwt_secret,

            max_comment_length: env::var("MAX_COMMENT_LENGTH")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()?,
            default_comments_per_page: env::var("DEFAULT_COMMENTS_PER_PAGE")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            max_comments_per_page: env::var("MAX_COMMENTS_PER_PAGE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),

            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            channel_url: env::var("CHANNEL_URL").unwrap_or(defaults.channel_url),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,
            channel_reconnect_secs: env::var("CHANNEL_RECONNECT_SECS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// `memory` keeps everything in-process; anything else is a SurrealDB endpoint.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url == "memory"
    }

    /// Never shorter than one second; a zero period cannot drive a timer.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn channel_reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.channel_reconnect_secs)
    }

    /// Clamp a requested page size into `1..=max_comments_per_page`.
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_comments_per_page)
            .clamp(1, self.max_comments_per_page.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            environment: "development".to_string(),
            log_level: "comment_sync=debug,tower_http=debug".to_string(),

            database_url: "memory".to_string(),
            database_namespace: "rainbow".to_string(),
            database_name: "blog".to_string(),
            database_username: "root".to_string(),
            database_password: "root".to_string(),

            jwt_secret: DEV_JWT_SECRET.to_string(),

            max_comment_length: 5000,
            default_comments_per_page: 10,
            max_comments_per_page: 100,

            rate_limit_requests: 100,

            cors_allowed_origins: "http://localhost:3001".to_string(),

            api_base_url: "http://localhost:3000".to_string(),
            channel_url: "ws://localhost:3000/api/blog/channel".to_string(),
            poll_interval_secs: 10,
            channel_reconnect_secs: 1,
        }
    }
}
