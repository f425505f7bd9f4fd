//! Stream state reconciliation
//!
//! Turns the media server's two observation channels (interval polling and
//! lifecycle webhooks) into one consistent view of which streams are live
//! and how many viewers each has.

pub mod actor;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod reconcile;
pub mod store;

pub use actor::{ReconcilerActor, ReconcilerCommand, ReconcilerHandle};
pub use models::{PathReader, PathSnapshot, PathSource, PathsList, StreamEvent, StreamRecord};
pub use monitor::{poll_once, run_snapshot_loop, MediaServerClient, SnapshotSource};
pub use notifier::{MetricsNotifier, Notifier};
pub use reconcile::{derive_stream_key, CycleStats, EventOutcome, Reconciler};
pub use store::{keys, RedisStore, StateStore, StoreError, StoreOp};
