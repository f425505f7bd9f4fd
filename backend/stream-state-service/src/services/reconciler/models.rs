//! Data model for the stream state reconciler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Authoritative per-stream state, stored as JSON under `stream:{key}`.
///
/// Retained with `is_live=false` for a bounded window after the stream stops
/// so "just ended" streams can still be queried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRecord {
    pub stream_key: String,
    pub start_time: DateTime<Utc>,
    pub viewer_count: u64,
    pub is_live: bool,
}

/// One entry from the media server's path list API.
#[derive(Debug, Clone, Deserialize)]
pub struct PathSnapshot {
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub source: Option<PathSource>,
    #[serde(default)]
    pub readers: Vec<PathReader>,
}

impl PathSnapshot {
    /// A path counts as live only when it is ready and has an active source.
    pub fn is_live(&self) -> bool {
        self.ready && self.source.is_some()
    }

    pub fn reader_count(&self) -> u64 {
        self.readers.len() as u64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathReader {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

/// Envelope returned by the media server's `/v3/paths/list` endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsList {
    pub item_count: u64,
    pub page_count: u64,
    pub items: Vec<PathSnapshot>,
}

/// Lifecycle event delivered by the media server's webhooks.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Start { stream_key: String },
    Stop { stream_key: String },
    ViewerJoin { stream_key: String, viewer: String },
    ViewerLeave { stream_key: String, viewer: String },
}

impl StreamEvent {
    pub fn stream_key(&self) -> &str {
        match self {
            StreamEvent::Start { stream_key }
            | StreamEvent::Stop { stream_key }
            | StreamEvent::ViewerJoin { stream_key, .. }
            | StreamEvent::ViewerLeave { stream_key, .. } => stream_key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Start { .. } => "stream_start",
            StreamEvent::Stop { .. } => "stream_stop",
            StreamEvent::ViewerJoin { .. } => "viewer_join",
            StreamEvent::ViewerLeave { .. } => "viewer_leave",
        }
    }

    /// Reject malformed events before any state is touched.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.stream_key().trim().is_empty() {
            return Err(AppError::Validation("stream_key must not be empty".into()));
        }
        match self {
            StreamEvent::ViewerJoin { viewer, .. } | StreamEvent::ViewerLeave { viewer, .. }
                if viewer.trim().is_empty() =>
            {
                Err(AppError::Validation(
                    "viewer identity must not be empty".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}
