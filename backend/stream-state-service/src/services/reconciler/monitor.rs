//! Snapshot monitor
//!
//! Polls the media server's path list on a fixed interval and hands each
//! snapshot to the reconciler actor. A failed fetch or decode skips the
//! cycle; it is never reported as "zero paths".

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::metrics;

use super::actor::ReconcilerHandle;
use super::models::{PathSnapshot, PathsList};

/// On-demand snapshot of the media server's active paths.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_paths(&self) -> Result<Vec<PathSnapshot>>;
}

/// HTTP client for a MediaMTX-style control API.
pub struct MediaServerClient {
    http: reqwest::Client,
    base_url: String,
}

impl MediaServerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build media server HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SnapshotSource for MediaServerClient {
    async fn fetch_paths(&self) -> Result<Vec<PathSnapshot>> {
        let url = format!("{}/v3/paths/list", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("path list request failed")?
            .error_for_status()
            .context("path list returned an error status")?;
        let list: PathsList = response
            .json()
            .await
            .context("failed to decode path list")?;
        Ok(list.items)
    }
}

/// Run one poll cycle: fetch, then enqueue for reconciliation.
pub async fn poll_once(source: &dyn SnapshotSource, reconciler: &ReconcilerHandle) {
    match source.fetch_paths().await {
        Ok(paths) => match reconciler.reconcile_snapshot(paths).await {
            Ok(()) => metrics::record_reconcile_cycle("ok"),
            Err(err) => {
                metrics::record_reconcile_cycle("enqueue_error");
                warn!(error = %err, "failed to enqueue snapshot for reconciliation");
            }
        },
        Err(err) => {
            metrics::record_reconcile_cycle("fetch_error");
            warn!(error = %err, "snapshot fetch failed; keeping previous state");
        }
    }
}

/// Poll until the shutdown signal fires. Stopping the timer before the actor
/// drains guarantees no new work is admitted during shutdown.
pub async fn run_snapshot_loop(
    source: Arc<dyn SnapshotSource>,
    reconciler: ReconcilerHandle,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("snapshot monitor stopping");
                break;
            }
            _ = ticker.tick() => {
                poll_once(source.as_ref(), &reconciler).await;
            }
        }
    }
}
