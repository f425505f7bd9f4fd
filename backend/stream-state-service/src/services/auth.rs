//! Publish credential check
//!
//! Adjacent to the reconciler: it only shares the state store. The media
//! server asks before accepting an RTMP publish; the credential is compared
//! against the per-stream secret stored under `stream_key:{key}`.

use std::sync::Arc;

use tracing::debug;

use super::reconciler::reconcile::derive_stream_key;
use super::reconciler::store::{keys, StateStore, StoreError};

pub struct PublishAuth {
    store: Arc<dyn StateStore>,
    path_prefix: String,
}

impl PublishAuth {
    pub fn new(store: Arc<dyn StateStore>, path_prefix: impl Into<String>) -> Self {
        Self {
            store,
            path_prefix: path_prefix.into(),
        }
    }

    /// Gate for the media server's external auth hook. Only publish attempts
    /// are credential-checked; read actions pass through so playback is
    /// never blocked by this service.
    pub async fn authorize(
        &self,
        action: &str,
        path: &str,
        user: &str,
        password: &str,
    ) -> Result<bool, StoreError> {
        if action != "publish" {
            return Ok(true);
        }
        self.authorize_publish(path, user, password).await
    }

    /// A publish credential is valid only when the username equals the
    /// stream key derived from the path AND the password matches the stored
    /// per-stream secret. There is deliberately no any-username fallback.
    pub async fn authorize_publish(
        &self,
        path: &str,
        user: &str,
        password: &str,
    ) -> Result<bool, StoreError> {
        let Some(stream_key) = derive_stream_key(&self.path_prefix, path.trim_matches('/')) else {
            debug!(%path, "publish auth rejected: path outside the stream namespace");
            return Ok(false);
        };
        if user != stream_key || password.is_empty() {
            return Ok(false);
        }
        let stored = self.store.get(&keys::publish_secret(stream_key)).await?;
        Ok(stored.as_deref() == Some(password))
    }
}
