//! REST storage interface - what the generic server dispatches requests into.
//!
//! Storages are type-erased: objects cross this boundary as JSON values, so
//! one server can hold storages for any number of object types. A storage
//! only has to construct empty objects and report its scope; each verb it
//! supports is exposed through one of the optional accessors. Verbs left at
//! `None` answer `405 MethodNotAllowed` and are left out of discovery.
//!
//! ## Example
//!
//! ```ignore
//! struct DemoGetter;
//!
//! impl Storage for DemoGetter {
//!     fn new_object(&self) -> Value { json!({}) }
//!     fn kind(&self) -> &str { "Demo" }
//!     fn namespace_scoped(&self) -> bool { true }
//!     fn getter(&self) -> Option<&dyn Getter> { Some(self) }
//! }
//!
//! impl Getter for DemoGetter {
//!     fn get(&self, ctx: &RequestContext, name: &str, _: &GetOptions) -> Result<Value, StatusError> {
//!         Ok(json!({ "metadata": { "name": name, "namespace": ctx.namespace_value() } }))
//!     }
//! }
//! ```

use serde_json::Value;

use crate::error::StatusError;
use crate::meta::{DeleteOptions, GetOptions, ListOptions};
use crate::request::RequestContext;
use crate::storage::WatchStream;

/// A served resource.
pub trait Storage: Send + Sync {
    /// An empty instance of the served object.
    fn new_object(&self) -> Value;

    /// The kind name of the served object.
    fn kind(&self) -> &str;

    fn namespace_scoped(&self) -> bool;

    fn getter(&self) -> Option<&dyn Getter> {
        None
    }

    fn lister(&self) -> Option<&dyn Lister> {
        None
    }

    fn creater(&self) -> Option<&dyn Creater> {
        None
    }

    fn updater(&self) -> Option<&dyn Updater> {
        None
    }

    fn deleter(&self) -> Option<&dyn Deleter> {
        None
    }

    fn watcher(&self) -> Option<&dyn Watcher> {
        None
    }
}

pub trait Getter: Send + Sync {
    fn get(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &GetOptions,
    ) -> Result<Value, StatusError>;
}

pub trait Lister: Send + Sync {
    /// An empty list of the served object.
    fn new_list(&self) -> Value;

    fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<Value, StatusError>;
}

pub trait Creater: Send + Sync {
    fn create(&self, ctx: &RequestContext, object: Value) -> Result<Value, StatusError>;
}

pub trait Updater: Send + Sync {
    /// Replace the named object. The flag reports whether it was created.
    fn update(
        &self,
        ctx: &RequestContext,
        name: &str,
        object: Value,
    ) -> Result<(Value, bool), StatusError>;
}

pub trait Deleter: Send + Sync {
    /// Delete the named object and return it.
    fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<Value, StatusError>;
}

pub trait Watcher: Send + Sync {
    fn watch(&self, ctx: &RequestContext, options: &ListOptions)
        -> Result<WatchStream, StatusError>;
}

/// The discovery verbs a storage supports, in sorted order.
pub fn supported_verbs(storage: &dyn Storage) -> Vec<&'static str> {
    let mut verbs = Vec::new();
    if storage.creater().is_some() {
        verbs.push("create");
    }
    if storage.deleter().is_some() {
        verbs.push("delete");
    }
    if storage.getter().is_some() {
        verbs.push("get");
    }
    if storage.lister().is_some() {
        verbs.push("list");
    }
    if storage.updater().is_some() {
        verbs.push("update");
    }
    if storage.watcher().is_some() {
        verbs.push("watch");
    }
    verbs
}
