#![allow(dead_code)]

//! In-process test doubles for the reconciler's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use stream_state_service::services::reconciler::{
    Notifier, PathReader, PathSnapshot, PathSource, StateStore, StoreError, StoreOp,
};

#[derive(Default)]
struct StoreData {
    strings: HashMap<String, String>,
    ttls: HashMap<String, Duration>,
    sets: HashMap<String, HashSet<String>>,
    published: Vec<(String, String)>,
}

/// In-memory `StateStore`. Batches apply atomically; setting `fail_batches`
/// makes `execute` reject without applying anything.
#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<StoreData>,
    fail_batches: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.data.lock().unwrap().published.clone()
    }

    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.data
            .lock()
            .unwrap()
            .published
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().strings.get(key).cloned()
    }

    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.data.lock().unwrap().ttls.get(key).copied()
    }

    pub fn members(&self, set: &str) -> HashSet<String> {
        self.data
            .lock()
            .unwrap()
            .sets
            .get(set)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed_value(&self, key: &str, value: &str) {
        self.data
            .lock()
            .unwrap()
            .strings
            .insert(key.to_string(), value.to_string());
    }

    fn apply(data: &mut StoreData, op: &StoreOp) {
        match op {
            StoreOp::Set { key, value, ttl } => {
                data.strings.insert(key.clone(), value.clone());
                match ttl {
                    Some(ttl) => {
                        data.ttls.insert(key.clone(), *ttl);
                    }
                    None => {
                        data.ttls.remove(key);
                    }
                }
            }
            StoreOp::Delete { key } => {
                data.strings.remove(key);
                data.ttls.remove(key);
                data.sets.remove(key);
            }
            StoreOp::SetAdd { set, member } => {
                data.sets.entry(set.clone()).or_default().insert(member.clone());
            }
            StoreOp::SetRemove { set, member } => {
                if let Some(members) = data.sets.get_mut(set) {
                    members.remove(member);
                }
            }
            StoreOp::Publish { channel, message } => {
                data.published.push((channel.clone(), message.clone()));
            }
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.data.lock().unwrap().strings.get(key).cloned())
    }

    async fn set_contains(&self, set: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self.members(set).contains(member))
    }

    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.members(set).into_iter().collect())
    }

    async fn set_size(&self, set: &str) -> Result<u64, StoreError> {
        Ok(self.members(set).len() as u64)
    }

    async fn execute(&self, batch: Vec<StoreOp>) -> Result<(), StoreError> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(StoreError::Other("injected batch failure".into()));
        }
        let mut data = self.data.lock().unwrap();
        for op in &batch {
            Self::apply(&mut data, op);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Start(String),
    Stop(String),
    ViewerCount(String, u64),
}

/// Notifier that records every call for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn starts_for(&self, stream_key: &str) -> usize {
        self.all()
            .iter()
            .filter(|n| matches!(n, Notification::Start(k) if k == stream_key))
            .count()
    }

    pub fn stops_for(&self, stream_key: &str) -> usize {
        self.all()
            .iter()
            .filter(|n| matches!(n, Notification::Stop(k) if k == stream_key))
            .count()
    }

    pub fn counts_for(&self, stream_key: &str) -> Vec<u64> {
        self.all()
            .iter()
            .filter_map(|n| match n {
                Notification::ViewerCount(k, count) if k == stream_key => Some(*count),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.notifications.lock().unwrap().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_start(&self, stream_key: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push(Notification::Start(stream_key.to_string()));
    }

    async fn notify_stop(&self, stream_key: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push(Notification::Stop(stream_key.to_string()));
    }

    async fn notify_viewer_count(&self, stream_key: &str, count: u64) {
        self.notifications
            .lock()
            .unwrap()
            .push(Notification::ViewerCount(stream_key.to_string(), count));
    }
}

/// A ready path with an active source and the given number of readers.
pub fn live_path(name: &str, readers: usize) -> PathSnapshot {
    PathSnapshot {
        name: name.to_string(),
        ready: true,
        source: Some(PathSource {
            kind: "rtmpConn".into(),
            id: "src-1".into(),
        }),
        readers: (0..readers)
            .map(|i| PathReader {
                kind: "hlsMuxer".into(),
                id: format!("reader-{i}"),
            })
            .collect(),
    }
}

/// A path the media server still lists but that is not ready.
pub fn idle_path(name: &str) -> PathSnapshot {
    PathSnapshot {
        name: name.to_string(),
        ready: false,
        source: None,
        readers: Vec::new(),
    }
}
