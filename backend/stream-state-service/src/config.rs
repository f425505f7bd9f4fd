//! Environment-based configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub redis_url: String,
    /// Base URL of the media server's control API.
    pub media_api_url: String,
    pub poll_interval: Duration,
    pub snapshot_timeout: Duration,
    /// Path namespace that carries streams; everything else is ignored.
    pub stream_path_prefix: String,
    /// How long a stopped stream's record is retained for late queries.
    pub stopped_retention: Duration,
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("PORT", 8080),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            media_api_url: env::var("MEDIA_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:9997".into()),
            poll_interval: Duration::from_millis(env_parse("POLL_INTERVAL_MS", 2000)),
            snapshot_timeout: Duration::from_millis(env_parse("SNAPSHOT_TIMEOUT_MS", 2000)),
            stream_path_prefix: env::var("STREAM_PATH_PREFIX").unwrap_or_else(|_| "stream".into()),
            stopped_retention: Duration::from_secs(env_parse("STOPPED_RETENTION_SECS", 86_400)),
            shutdown_grace: Duration::from_secs(env_parse("SHUTDOWN_GRACE_SECS", 5)),
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
