//! Persistence handles - the backend behind every generic store.
//!
//! A [`Backend`] stores JSON snapshots of objects under string keys and
//! assigns each write a backend-wide, strictly increasing revision. Stores
//! obtain a backend through a [`RestOptionsGetter`], so the same store code
//! runs against the bundled [`InMemoryBackend`] or any external database
//! adapter.
//!
//! ## Example
//!
//! ```ignore
//! let getter = InMemoryRestOptionsGetter::new("/registry");
//! let options = getter.get_rest_options(&GroupResource::new("examples.k8s.io", "demos"))?;
//! let stored = options.backend.create("/registry/examples.k8s.io/demos/bar/foo", json!({}))?;
//! assert_eq!(stored.version, 1);
//! ```

mod in_memory;
mod selection;
mod watch;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::meta::GroupResource;

pub use in_memory::{InMemoryBackend, InMemoryRestOptionsGetter};
pub use selection::{
    decode_continue, encode_continue, labels_of, FieldRequirement, FieldSelector,
    LabelRequirement, LabelSelector, SelectionPredicate,
};
pub use watch::{BackendEvent, EventType, WatchEvent, WatchStream};

/// Error type for backend operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("key not found: {key}")]
    NotFound { key: String },
    #[error("key already exists: {key}")]
    AlreadyExists { key: String },
    /// Compare-and-swap failed.
    #[error("version conflict on {key} (expected version {expected}, actual {actual})")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },
    #[error("backend lock poisoned during {0}")]
    LockPoisoned(&'static str),
    #[error("invalid continue token: {0}")]
    InvalidContinue(String),
    /// A watch asked for history the backend no longer retains.
    #[error("resource version {requested} is too old (oldest available is {oldest})")]
    TooOldResourceVersion { requested: u64, oldest: u64 },
    /// The backend could not be reached. Transient.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// An object as read from or written to a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub value: Value,
    pub version: u64,
}

/// One page of a list.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub items: Vec<StoredObject>,
    /// Backend revision the page was read at.
    pub version: u64,
    pub continue_token: Option<String>,
    pub remaining: Option<u64>,
}

/// Abstract key-value persistence with optimistic concurrency.
pub trait Backend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StoredObject>, BackendError>;

    /// Insert a new key. Fails with `AlreadyExists` if present.
    fn create(&self, key: &str, value: Value) -> Result<StoredObject, BackendError>;

    /// Replace a key if its current version is `expected_version`.
    fn update(
        &self,
        key: &str,
        value: Value,
        expected_version: u64,
    ) -> Result<StoredObject, BackendError>;

    /// Remove a key, optionally only at `expected_version`. Returns the removed object.
    fn delete(
        &self,
        key: &str,
        expected_version: Option<u64>,
    ) -> Result<StoredObject, BackendError>;

    /// List keys under `prefix` that match the predicate, in key order.
    fn list(&self, prefix: &str, predicate: &SelectionPredicate) -> Result<ListPage, BackendError>;

    /// Watch keys under `prefix`.
    ///
    /// With `from = None` the stream starts with an `ADDED` event for every
    /// current match. With `from = Some(v)` it replays changes after `v`.
    fn watch(
        &self,
        prefix: &str,
        predicate: SelectionPredicate,
        from: Option<u64>,
    ) -> Result<WatchStream, BackendError>;

    /// The latest revision.
    fn current_version(&self) -> Result<u64, BackendError>;
}

/// Everything a store needs from the persistence layer for one resource.
#[derive(Clone)]
pub struct RestOptions {
    pub backend: Arc<dyn Backend>,
    /// Key prefix for this resource, e.g. `/registry/examples.k8s.io/demos`.
    pub resource_prefix: String,
}

/// Provider of per-resource persistence handles.
pub trait RestOptionsGetter: Send + Sync {
    fn get_rest_options(&self, resource: &GroupResource) -> Result<RestOptions, BackendError>;
}

/// Key prefix for a resource below a storage root.
pub fn resource_prefix(root: &str, resource: &GroupResource) -> String {
    let root = root.trim_end_matches('/');
    if resource.group.is_empty() {
        format!("{}/{}", root, resource.resource)
    } else {
        format!("{}/{}/{}", root, resource.group, resource.resource)
    }
}

/// Write `metadata.resourceVersion` into a JSON object.
pub fn set_resource_version(value: &mut Value, version: u64) {
    if let Value::Object(map) = value {
        let metadata = map
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(meta) = metadata {
            meta.insert(
                "resourceVersion".to_string(),
                Value::String(version.to_string()),
            );
        }
    }
}

/// Remove `metadata.resourceVersion` from a JSON object before it is persisted.
pub fn clear_resource_version(value: &mut Value) {
    if let Some(Value::Object(meta)) = value.get_mut("metadata") {
        meta.remove("resourceVersion");
    }
}
