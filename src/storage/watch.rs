//! Watch events and the stream handed to watchers.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::selection::SelectionPredicate;
use super::set_resource_version;

/// The kind of change a watch event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
}

/// A change delivered to watchers. `object` carries its resource version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub object: Value,
}

/// A raw change as recorded by a backend.
#[derive(Debug, Clone)]
pub struct BackendEvent {
    pub event_type: EventType,
    pub key: String,
    pub value: Value,
    /// The object before the change, for modifications and deletions.
    pub prev_value: Option<Value>,
    pub version: u64,
}

impl BackendEvent {
    /// Translate a raw change into what a filtered watcher should see.
    ///
    /// An object that starts or stops matching the predicate is reported as
    /// added or deleted respectively.
    pub fn to_watch_event(&self, prefix: &str, predicate: &SelectionPredicate) -> Option<WatchEvent> {
        if !self.key.starts_with(prefix) {
            return None;
        }
        let current = predicate.matches(&self.value);
        let previous = self
            .prev_value
            .as_ref()
            .map(|v| predicate.matches(v))
            .unwrap_or(false);

        let event_type = match self.event_type {
            EventType::Added if current => EventType::Added,
            EventType::Modified if current && previous => EventType::Modified,
            EventType::Modified if current => EventType::Added,
            EventType::Modified if previous => EventType::Deleted,
            EventType::Deleted if previous || current => EventType::Deleted,
            _ => return None,
        };

        let mut object = self.value.clone();
        set_resource_version(&mut object, self.version);
        Some(WatchEvent { event_type, object })
    }
}

/// A filtered stream of watch events.
///
/// Starts with any buffered initial events, then follows live changes.
/// Ends when the backend goes away or the watcher falls too far behind.
pub struct WatchStream {
    initial: VecDeque<WatchEvent>,
    receiver: broadcast::Receiver<BackendEvent>,
    prefix: String,
    predicate: SelectionPredicate,
    // Live events at or below this version were already covered by `initial`.
    after: u64,
    done: bool,
}

impl WatchStream {
    pub(crate) fn new(
        initial: VecDeque<WatchEvent>,
        receiver: broadcast::Receiver<BackendEvent>,
        prefix: String,
        predicate: SelectionPredicate,
        after: u64,
    ) -> Self {
        Self {
            initial,
            receiver,
            prefix,
            predicate,
            after,
            done: false,
        }
    }

    /// Wait for the next event. Returns `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        if let Some(event) = self.initial.pop_front() {
            return Some(event);
        }
        while !self.done {
            match self.receiver.recv().await {
                Ok(raw) => {
                    if let Some(event) = self.accept(&raw) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, prefix = %self.prefix, "watcher fell behind; closing watch");
                    self.done = true;
                }
                Err(RecvError::Closed) => self.done = true,
            }
        }
        None
    }

    /// Return the next event if one is ready, without waiting.
    pub fn try_next(&mut self) -> Option<WatchEvent> {
        if let Some(event) = self.initial.pop_front() {
            return Some(event);
        }
        while !self.done {
            match self.receiver.try_recv() {
                Ok(raw) => {
                    if let Some(event) = self.accept(&raw) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, prefix = %self.prefix, "watcher fell behind; closing watch");
                    self.done = true;
                }
                Err(TryRecvError::Closed) => self.done = true,
            }
        }
        None
    }

    /// Drain every event that is ready now.
    pub fn ready_events(&mut self) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_next() {
            events.push(event);
        }
        events
    }

    fn accept(&mut self, raw: &BackendEvent) -> Option<WatchEvent> {
        if raw.version <= self.after {
            return None;
        }
        raw.to_watch_event(&self.prefix, &self.predicate)
    }
}
