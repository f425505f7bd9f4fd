//! Stream state reconciliation (core logic)
//!
//! Two independent observation paths converge here: the interval-driven
//! snapshot of the media server's path list, and the webhook-driven lifecycle
//! events. Both decide "is this a transition" against the same cached
//! last-known state and the same authoritative records, so a real-world
//! transition is announced exactly once no matter which path sees it first.
//! All calls are serialized by the owning actor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::metrics;

use super::models::{PathSnapshot, StreamEvent, StreamRecord};
use super::notifier::Notifier;
use super::store::{keys, StateStore, StoreError, StoreOp};

/// Derive a stream key from a media server path name.
///
/// Paths outside the `{prefix}/` namespace yield `None` and are skipped
/// entirely; the path namespace carries unrelated entries by design.
pub fn derive_stream_key<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?.strip_prefix('/')?;
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// Outcome of applying one lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The transition was applied and announced.
    Applied,
    /// The observation matched already-applied state; nothing was announced.
    AlreadyApplied,
    /// Viewer membership change; carries the current set cardinality.
    ViewerCount(u64),
}

/// Per-cycle summary for the snapshot path.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub started: usize,
    pub stopped: usize,
    pub count_updates: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    path_prefix: String,
    stopped_retention: Duration,
    /// Last-seen live keys: a cache of what we last told the world, not the
    /// source of truth. The store stays authoritative for external readers.
    live: HashSet<String>,
    /// Last-seen viewer count per live key.
    counts: HashMap<String, u64>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        path_prefix: impl Into<String>,
        stopped_retention: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            path_prefix: path_prefix.into(),
            stopped_retention,
            live: HashSet::new(),
            counts: HashMap::new(),
        }
    }

    /// Reconcile one snapshot of the media server's current paths.
    ///
    /// A failed fetch never reaches this method: the monitor skips the cycle
    /// instead, so an errored snapshot can never read as a mass stop.
    pub async fn reconcile_snapshot(&mut self, paths: Vec<PathSnapshot>) -> CycleStats {
        let mut stats = CycleStats::default();
        let mut next_live: HashSet<String> = HashSet::new();
        let mut next_counts: HashMap<String, u64> = HashMap::new();

        for path in &paths {
            if !path.is_live() {
                continue;
            }
            let Some(stream_key) = derive_stream_key(&self.path_prefix, &path.name) else {
                continue;
            };
            let stream_key = stream_key.to_string();
            let observed_count = path.reader_count();

            if !self.live.contains(&stream_key) && !next_live.contains(&stream_key) {
                match self.start_stream(&stream_key).await {
                    Ok(announced) => {
                        if announced {
                            stats.started += 1;
                        }
                    }
                    Err(err) => {
                        // Leave the key out of the cache so the next cycle
                        // retries and the start notification is not lost.
                        warn!(%stream_key, error = %err, "stream start not applied; retrying next cycle");
                        metrics::record_transition_failure("start");
                        stats.failed += 1;
                        continue;
                    }
                }
            }
            next_live.insert(stream_key.clone());

            let previous_count = self.counts.get(&stream_key).copied();
            if previous_count != Some(observed_count) {
                match self.update_viewer_count(&stream_key, observed_count).await {
                    Ok(()) => {
                        stats.count_updates += 1;
                        next_counts.insert(stream_key, observed_count);
                    }
                    Err(err) => {
                        warn!(%stream_key, error = %err, "viewer count update not applied");
                        metrics::record_transition_failure("viewer_count");
                        stats.failed += 1;
                        if let Some(previous) = previous_count {
                            next_counts.insert(stream_key, previous);
                        }
                    }
                }
            } else {
                next_counts.insert(stream_key, observed_count);
            }
        }

        // Keys we believed live that the snapshot no longer reports.
        let stopped_keys: Vec<String> = self
            .live
            .iter()
            .filter(|key| !next_live.contains(*key))
            .cloned()
            .collect();
        for stream_key in stopped_keys {
            match self.stop_stream(&stream_key).await {
                Ok(announced) => {
                    if announced {
                        stats.stopped += 1;
                    }
                }
                Err(err) => {
                    // Still considered live; the stop is retried next cycle.
                    warn!(%stream_key, error = %err, "stream stop not applied; retrying next cycle");
                    metrics::record_transition_failure("stop");
                    stats.failed += 1;
                    next_live.insert(stream_key.clone());
                    if let Some(count) = self.counts.get(&stream_key) {
                        next_counts.insert(stream_key, *count);
                    }
                }
            }
        }

        self.live = next_live;
        self.counts = next_counts;
        debug!(
            started = stats.started,
            stopped = stats.stopped,
            count_updates = stats.count_updates,
            failed = stats.failed,
            live = self.live.len(),
            "reconcile cycle complete"
        );
        stats
    }

    /// Apply one webhook lifecycle event. Malformed events are rejected
    /// before any state is touched.
    pub async fn apply_event(&mut self, event: StreamEvent) -> Result<EventOutcome, AppError> {
        event.validate()?;
        match event {
            StreamEvent::Start { stream_key } => {
                let announced = self.start_stream(stream_key.trim()).await?;
                Ok(if announced {
                    EventOutcome::Applied
                } else {
                    EventOutcome::AlreadyApplied
                })
            }
            StreamEvent::Stop { stream_key } => {
                let announced = self.stop_stream(stream_key.trim()).await?;
                Ok(if announced {
                    EventOutcome::Applied
                } else {
                    EventOutcome::AlreadyApplied
                })
            }
            StreamEvent::ViewerJoin { stream_key, viewer } => {
                self.viewer_join(stream_key.trim(), viewer.trim()).await
            }
            StreamEvent::ViewerLeave { stream_key, viewer } => {
                self.viewer_leave(stream_key.trim(), viewer.trim()).await
            }
        }
    }

    /// Idempotent stream start shared by both observation paths.
    ///
    /// Returns true when a start was actually announced. The decision is made
    /// against the previous persisted state, not against which path
    /// triggered the call, so a poll observation and a start webhook for the
    /// same key converge on one record and one notification.
    async fn start_stream(&mut self, stream_key: &str) -> Result<bool, StoreError> {
        if self.live.contains(stream_key) {
            return Ok(false);
        }

        if let Some(existing) = self.load_record(stream_key).await? {
            if existing.is_live {
                // Already live per the authoritative record (e.g. this
                // process restarted): adopt it without re-announcing.
                self.store
                    .execute(vec![StoreOp::SetAdd {
                        set: keys::LIVE_STREAMS.into(),
                        member: stream_key.into(),
                    }])
                    .await?;
                self.live.insert(stream_key.to_string());
                return Ok(false);
            }
        }

        let record = StreamRecord {
            stream_key: stream_key.to_string(),
            start_time: Utc::now(),
            viewer_count: 0,
            is_live: true,
        };
        let batch = vec![
            StoreOp::Set {
                key: keys::stream_record(stream_key),
                value: serde_json::to_string(&record)?,
                ttl: None,
            },
            StoreOp::SetAdd {
                set: keys::LIVE_STREAMS.into(),
                member: stream_key.into(),
            },
            StoreOp::Publish {
                channel: keys::STREAM_EVENTS_CHANNEL.into(),
                message: format!("start:{stream_key}"),
            },
        ];
        self.store.execute(batch).await?;

        self.live.insert(stream_key.to_string());
        self.notifier.notify_start(stream_key).await;
        Ok(true)
    }

    /// Idempotent stream stop. The record is retained with `is_live=false`
    /// for the retention window; viewer tracking is always cleared, even
    /// when the stream was already stopped.
    async fn stop_stream(&mut self, stream_key: &str) -> Result<bool, StoreError> {
        let previous = self.load_record(stream_key).await?;
        let was_live =
            self.live.contains(stream_key) || previous.as_ref().is_some_and(|r| r.is_live);

        let mut batch = Vec::new();
        if let Some(mut record) = previous {
            record.is_live = false;
            record.viewer_count = 0;
            batch.push(StoreOp::Set {
                key: keys::stream_record(stream_key),
                value: serde_json::to_string(&record)?,
                ttl: Some(self.stopped_retention),
            });
        }
        batch.push(StoreOp::SetRemove {
            set: keys::LIVE_STREAMS.into(),
            member: stream_key.into(),
        });
        batch.push(StoreOp::Delete {
            key: keys::viewer_set(stream_key),
        });
        batch.push(StoreOp::Delete {
            key: keys::viewer_count(stream_key),
        });
        if was_live {
            batch.push(StoreOp::Publish {
                channel: keys::STREAM_EVENTS_CHANNEL.into(),
                message: format!("stop:{stream_key}"),
            });
        }
        self.store.execute(batch).await?;

        self.live.remove(stream_key);
        self.counts.remove(stream_key);
        if was_live {
            self.notifier.notify_stop(stream_key).await;
        }
        Ok(was_live)
    }

    /// Membership is checked without mutating, and the set mutation rides in
    /// the same batch as the count publish: a rejected batch leaves the set
    /// untouched, so a retried join is still a cardinality change and the
    /// notification is republished rather than lost.
    async fn viewer_join(
        &mut self,
        stream_key: &str,
        viewer: &str,
    ) -> Result<EventOutcome, AppError> {
        let set_key = keys::viewer_set(stream_key);
        if self.store.set_contains(&set_key, viewer).await? {
            // Duplicate join; cardinality did not move.
            return Ok(EventOutcome::ViewerCount(
                self.store.set_size(&set_key).await?,
            ));
        }
        let count = self.store.set_size(&set_key).await? + 1;
        let mut batch = vec![StoreOp::SetAdd {
            set: set_key,
            member: viewer.to_string(),
        }];
        batch.extend(self.count_ops(stream_key, count).await?);
        self.commit_count(stream_key, count, batch).await?;
        Ok(EventOutcome::ViewerCount(count))
    }

    async fn viewer_leave(
        &mut self,
        stream_key: &str,
        viewer: &str,
    ) -> Result<EventOutcome, AppError> {
        let set_key = keys::viewer_set(stream_key);
        if !self.store.set_contains(&set_key, viewer).await? {
            return Ok(EventOutcome::ViewerCount(
                self.store.set_size(&set_key).await?,
            ));
        }
        let count = self.store.set_size(&set_key).await?.saturating_sub(1);
        let mut batch = vec![StoreOp::SetRemove {
            set: set_key,
            member: viewer.to_string(),
        }];
        batch.extend(self.count_ops(stream_key, count).await?);
        self.commit_count(stream_key, count, batch).await?;
        Ok(EventOutcome::ViewerCount(count))
    }

    /// Persist and announce a confirmed viewer count (snapshot path).
    async fn update_viewer_count(&mut self, stream_key: &str, count: u64) -> Result<(), StoreError> {
        let batch = self.count_ops(stream_key, count).await?;
        self.commit_count(stream_key, count, batch).await
    }

    /// Ops persisting a viewer count: the record (only rewritten while live,
    /// so a stopped record keeps its retention TTL), the count key, and the
    /// channel publish.
    async fn count_ops(&self, stream_key: &str, count: u64) -> Result<Vec<StoreOp>, StoreError> {
        let mut batch = Vec::new();
        if let Some(mut record) = self.load_record(stream_key).await? {
            if record.is_live {
                record.viewer_count = count;
                batch.push(StoreOp::Set {
                    key: keys::stream_record(stream_key),
                    value: serde_json::to_string(&record)?,
                    ttl: None,
                });
            }
        }
        batch.push(StoreOp::Set {
            key: keys::viewer_count(stream_key),
            value: count.to_string(),
            ttl: None,
        });
        batch.push(StoreOp::Publish {
            channel: keys::VIEWER_EVENTS_CHANNEL.into(),
            message: format!("count:{stream_key}:{count}"),
        });
        Ok(batch)
    }

    async fn commit_count(
        &mut self,
        stream_key: &str,
        count: u64,
        batch: Vec<StoreOp>,
    ) -> Result<(), StoreError> {
        self.store.execute(batch).await?;
        self.counts.insert(stream_key.to_string(), count);
        self.notifier.notify_viewer_count(stream_key, count).await;
        Ok(())
    }

    async fn load_record(&self, stream_key: &str) -> Result<Option<StreamRecord>, StoreError> {
        let Some(raw) = self.store.get(&keys::stream_record(stream_key)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!(%stream_key, error = %err, "discarding unreadable stream record");
                Ok(None)
            }
        }
    }
}
