//! InMemoryBackend - BTreeMap-backed persistence for testing and development.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

use super::selection::{decode_continue, encode_continue, SelectionPredicate};
use super::watch::{BackendEvent, EventType, WatchEvent, WatchStream};
use super::{
    resource_prefix, set_resource_version, Backend, BackendError, ListPage, RestOptions,
    RestOptionsGetter, StoredObject,
};
use crate::meta::GroupResource;

const DEFAULT_HISTORY: usize = 1024;

/// Internal stored representation of an object.
struct Entry {
    value: Value,
    version: u64,
}

struct State {
    objects: BTreeMap<String, Entry>,
    revision: u64,
    history: VecDeque<BackendEvent>,
    // Highest revision evicted from `history`.
    compacted: u64,
}

/// In-memory backend.
///
/// Revisions are global across all keys, like an etcd revision. Clone-friendly
/// via Arc; clones share storage and the watch channel.
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<RwLock<State>>,
    events: broadcast::Sender<BackendEvent>,
    history_limit: usize,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Create a backend that keeps `history_limit` events for watch replay.
    pub fn with_history(history_limit: usize) -> Self {
        let history_limit = history_limit.max(1);
        let (events, _) = broadcast::channel(history_limit);
        Self {
            state: Arc::new(RwLock::new(State {
                objects: BTreeMap::new(),
                revision: 0,
                history: VecDeque::new(),
                compacted: 0,
            })),
            events,
            history_limit,
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, state: &mut State, event: BackendEvent) {
        state.history.push_back(event.clone());
        while state.history.len() > self.history_limit {
            if let Some(evicted) = state.history.pop_front() {
                state.compacted = evicted.version;
            }
        }
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl Backend for InMemoryBackend {
    fn get(&self, key: &str) -> Result<Option<StoredObject>, BackendError> {
        let state = self
            .state
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;

        Ok(state.objects.get(key).map(|entry| StoredObject {
            key: key.to_string(),
            value: entry.value.clone(),
            version: entry.version,
        }))
    }

    fn create(&self, key: &str, value: Value) -> Result<StoredObject, BackendError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| BackendError::LockPoisoned("write"))?;

        if state.objects.contains_key(key) {
            return Err(BackendError::AlreadyExists {
                key: key.to_string(),
            });
        }

        state.revision += 1;
        let version = state.revision;
        state.objects.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                version,
            },
        );
        self.record(
            &mut state,
            BackendEvent {
                event_type: EventType::Added,
                key: key.to_string(),
                value: value.clone(),
                prev_value: None,
                version,
            },
        );

        Ok(StoredObject {
            key: key.to_string(),
            value,
            version,
        })
    }

    fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<StoredObject, BackendError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| BackendError::LockPoisoned("write"))?;

        let actual = state
            .objects
            .get(key)
            .map(|e| e.version)
            .ok_or_else(|| BackendError::NotFound {
                key: key.to_string(),
            })?;

        if actual != expected_version {
            return Err(BackendError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                actual,
            });
        }

        state.revision += 1;
        let version = state.revision;
        let previous = state.objects.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                version,
            },
        );
        self.record(
            &mut state,
            BackendEvent {
                event_type: EventType::Modified,
                key: key.to_string(),
                value: value.clone(),
                prev_value: previous.map(|p| p.value),
                version,
            },
        );

        Ok(StoredObject {
            key: key.to_string(),
            value,
            version,
        })
    }

    fn delete(
        &self,
        key: &str,
        expected_version: Option<u64>,
    ) -> Result<StoredObject, BackendError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| BackendError::LockPoisoned("write"))?;

        let actual = state
            .objects
            .get(key)
            .map(|e| e.version)
            .ok_or_else(|| BackendError::NotFound {
                key: key.to_string(),
            })?;

        if let Some(expected) = expected_version {
            if expected != actual {
                return Err(BackendError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual,
                });
            }
        }

        let removed = state
            .objects
            .remove(key)
            .ok_or_else(|| BackendError::NotFound {
                key: key.to_string(),
            })?;
        state.revision += 1;
        let version = state.revision;
        self.record(
            &mut state,
            BackendEvent {
                event_type: EventType::Deleted,
                key: key.to_string(),
                value: removed.value.clone(),
                prev_value: Some(removed.value.clone()),
                version,
            },
        );

        Ok(StoredObject {
            key: key.to_string(),
            value: removed.value,
            version: removed.version,
        })
    }

    fn list(&self, prefix: &str, predicate: &SelectionPredicate) -> Result<ListPage, BackendError> {
        let start_after = match &predicate.continue_token {
            Some(token) => Some(decode_continue(token)?.1),
            None => None,
        };

        let state = self
            .state
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;

        let lower = match &start_after {
            Some(key) => Bound::Excluded(key.as_str()),
            None => Bound::Included(prefix),
        };

        let mut matched: Vec<StoredObject> = state
            .objects
            .range::<str, _>((lower, Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, entry)| predicate.matches(&entry.value))
            .map(|(key, entry)| StoredObject {
                key: key.clone(),
                value: entry.value.clone(),
                version: entry.version,
            })
            .collect();

        let mut page = ListPage {
            items: Vec::new(),
            version: state.revision,
            continue_token: None,
            remaining: None,
        };

        if let Some(limit) = predicate.limit.filter(|l| *l > 0) {
            if matched.len() > limit {
                let remaining = (matched.len() - limit) as u64;
                matched.truncate(limit);
                if let Some(last) = matched.last() {
                    page.continue_token = Some(encode_continue(state.revision, &last.key));
                    page.remaining = Some(remaining);
                }
            }
        }

        page.items = matched;
        Ok(page)
    }

    fn watch(
        &self,
        prefix: &str,
        predicate: SelectionPredicate,
        from: Option<u64>,
    ) -> Result<WatchStream, BackendError> {
        // Writers hold the write lock while broadcasting, so subscribing under
        // the read lock leaves no gap between the snapshot and live events.
        let state = self
            .state
            .read()
            .map_err(|_| BackendError::LockPoisoned("watch"))?;
        let receiver = self.events.subscribe();

        let initial: VecDeque<WatchEvent> = match from {
            None => state
                .objects
                .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                .take_while(|(key, _)| key.starts_with(prefix))
                .filter(|(_, entry)| predicate.matches(&entry.value))
                .map(|(_, entry)| {
                    let mut object = entry.value.clone();
                    set_resource_version(&mut object, entry.version);
                    WatchEvent {
                        event_type: EventType::Added,
                        object,
                    }
                })
                .collect(),
            Some(version) => {
                if version < state.compacted {
                    return Err(BackendError::TooOldResourceVersion {
                        requested: version,
                        oldest: state.compacted,
                    });
                }
                state
                    .history
                    .iter()
                    .filter(|event| event.version > version)
                    .filter_map(|event| event.to_watch_event(prefix, &predicate))
                    .collect()
            }
        };

        Ok(WatchStream::new(
            initial,
            receiver,
            prefix.to_string(),
            predicate,
            state.revision,
        ))
    }

    fn current_version(&self) -> Result<u64, BackendError> {
        let state = self
            .state
            .read()
            .map_err(|_| BackendError::LockPoisoned("read"))?;
        Ok(state.revision)
    }
}

/// Hands out the same in-memory backend to every resource, each under its own prefix.
#[derive(Clone)]
pub struct InMemoryRestOptionsGetter {
    backend: InMemoryBackend,
    root: String,
}

impl InMemoryRestOptionsGetter {
    pub fn new(root: impl Into<String>) -> Self {
        Self::with_backend(InMemoryBackend::new(), root)
    }

    pub fn with_backend(backend: InMemoryBackend, root: impl Into<String>) -> Self {
        Self {
            backend,
            root: root.into(),
        }
    }

    pub fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }
}

impl RestOptionsGetter for InMemoryRestOptionsGetter {
    fn get_rest_options(&self, resource: &GroupResource) -> Result<RestOptions, BackendError> {
        Ok(RestOptions {
            backend: Arc::new(self.backend.clone()),
            resource_prefix: resource_prefix(&self.root, resource),
        })
    }
}
