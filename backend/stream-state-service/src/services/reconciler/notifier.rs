//! Transition notifications
//!
//! The reconciler reports every confirmed transition through this trait.
//! Delivery is fire-and-forget: a notifier failure never rolls back the
//! state mutation that triggered it.

use async_trait::async_trait;
use tracing::info;

use crate::metrics;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_start(&self, stream_key: &str);
    async fn notify_stop(&self, stream_key: &str);
    async fn notify_viewer_count(&self, stream_key: &str, count: u64);
}

/// Production notifier: updates prometheus series and logs the transition.
/// The pub/sub message for downstream consumers rides in the store batch, so
/// this only covers the observability side.
pub struct MetricsNotifier;

#[async_trait]
impl Notifier for MetricsNotifier {
    async fn notify_start(&self, stream_key: &str) {
        metrics::record_stream_start(stream_key);
        info!(%stream_key, "stream started");
    }

    async fn notify_stop(&self, stream_key: &str) {
        metrics::record_stream_stop(stream_key);
        info!(%stream_key, "stream stopped");
    }

    async fn notify_viewer_count(&self, stream_key: &str, count: u64) {
        metrics::set_concurrent_viewers(stream_key, count);
        info!(%stream_key, count, "viewer count changed");
    }
}
