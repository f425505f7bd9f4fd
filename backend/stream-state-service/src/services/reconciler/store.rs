//! State store abstraction and its Redis implementation
//!
//! The reconciler talks to the store through the `StateStore` trait so the
//! core logic can be exercised against an in-memory double. One logical
//! transition (record update + live-index update + channel publish) is issued
//! as a single batch; if the batch fails the transition counts as not applied.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Key and channel names shared by both services that write the store.
pub mod keys {
    /// Set holding every currently-live stream key (the live index).
    pub const LIVE_STREAMS: &str = "live_streams";
    /// Channel carrying `start:{key}` / `stop:{key}` messages.
    pub const STREAM_EVENTS_CHANNEL: &str = "stream_events";
    /// Channel carrying `count:{key}:{n}` messages.
    pub const VIEWER_EVENTS_CHANNEL: &str = "viewer_events";

    pub fn stream_record(stream_key: &str) -> String {
        format!("stream:{stream_key}")
    }

    pub fn viewer_set(stream_key: &str) -> String {
        format!("viewers:{stream_key}")
    }

    pub fn viewer_count(stream_key: &str) -> String {
        format!("viewers:{stream_key}:count")
    }

    pub fn publish_secret(stream_key: &str) -> String {
        format!("stream_key:{stream_key}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// One operation inside a store batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    Delete {
        key: String,
    },
    SetAdd {
        set: String,
        member: String,
    },
    SetRemove {
        set: String,
        member: String,
    },
    Publish {
        channel: String,
        message: String,
    },
}

/// Key-value + set + publish/subscribe store consumed by the reconciler.
///
/// Reads are individual calls; every write goes through `execute` so a
/// transition either lands whole or not at all.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    async fn set_size(&self, set: &str) -> Result<u64, StoreError>;

    /// Execute a batch with a single success/failure outcome. An `Err` means
    /// the whole transition is treated as not applied.
    async fn execute(&self, batch: Vec<StoreOp>) -> Result<(), StoreError>;
}

/// Redis-backed store used in production.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the round trip. Store connectivity at startup is
    /// the one fatal error in this service.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = ConnectionManager::new(client).await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let found: bool = conn.sismember(set, member).await?;
        Ok(found)
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(set).await?;
        Ok(members)
    }

    async fn set_size(&self, set: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let size: u64 = conn.scard(set).await?;
        Ok(size)
    }

    async fn execute(&self, batch: Vec<StoreOp>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &batch {
            match op {
                StoreOp::Set {
                    key,
                    value,
                    ttl: Some(ttl),
                } => {
                    pipe.set_ex(key, value, ttl.as_secs()).ignore();
                }
                StoreOp::Set {
                    key,
                    value,
                    ttl: None,
                } => {
                    pipe.set(key, value).ignore();
                }
                StoreOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
                StoreOp::SetAdd { set, member } => {
                    pipe.sadd(set, member).ignore();
                }
                StoreOp::SetRemove { set, member } => {
                    pipe.srem(set, member).ignore();
                }
                StoreOp::Publish { channel, message } => {
                    pipe.publish(channel, message).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_match_store_layout() {
        assert_eq!(keys::stream_record("alpha"), "stream:alpha");
        assert_eq!(keys::viewer_set("alpha"), "viewers:alpha");
        assert_eq!(keys::viewer_count("alpha"), "viewers:alpha:count");
        assert_eq!(keys::publish_secret("alpha"), "stream_key:alpha");
    }
}
