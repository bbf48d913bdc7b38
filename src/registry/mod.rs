//! Registry - the generic store and its REST surface.
//!
//! A [`Store`] implements every verb of the REST storage interface by
//! decoding request bodies into its typed object and encoding results back
//! to JSON, so the server can serve it like any other storage.

mod hooks;
mod store;

use serde::Serialize;
use serde_json::Value;

use crate::error::StatusError;
use crate::meta::{list_kind, DeleteOptions, GetOptions, ListOptions, Object, ObjectList};
use crate::request::RequestContext;
use crate::rest;
use crate::storage::WatchStream;

pub use hooks::HookDispatcher;
pub(crate) use store::StoreFuncs;
pub use store::{AfterHook, NewFunc, NewListFunc, Store};

fn to_json<V: Serialize>(value: &V) -> Result<Value, StatusError> {
    serde_json::to_value(value).map_err(|e| StatusError::Internal(e.to_string()))
}

fn from_json<T: Object>(value: Value) -> Result<T, StatusError> {
    serde_json::from_value(value)
        .map_err(|e| StatusError::BadRequest(format!("decoding {}: {}", T::KIND, e)))
}

impl<T: Object, L: ObjectList<Item = T>> rest::Storage for Store<T, L> {
    fn new_object(&self) -> Value {
        to_json(&Store::new_object(self)).unwrap_or(Value::Null)
    }

    fn kind(&self) -> &str {
        T::KIND
    }

    fn namespace_scoped(&self) -> bool {
        Store::namespace_scoped(self)
    }

    fn getter(&self) -> Option<&dyn rest::Getter> {
        Some(self)
    }

    fn lister(&self) -> Option<&dyn rest::Lister> {
        Some(self)
    }

    fn creater(&self) -> Option<&dyn rest::Creater> {
        Some(self)
    }

    fn updater(&self) -> Option<&dyn rest::Updater> {
        Some(self)
    }

    fn deleter(&self) -> Option<&dyn rest::Deleter> {
        Some(self)
    }

    fn watcher(&self) -> Option<&dyn rest::Watcher> {
        Some(self)
    }
}

impl<T: Object, L: ObjectList<Item = T>> rest::Getter for Store<T, L> {
    fn get(&self, ctx: &RequestContext, name: &str, _options: &GetOptions) -> Result<Value, StatusError> {
        to_json(&Store::get(self, ctx, name)?)
    }
}

impl<T: Object, L: ObjectList<Item = T>> rest::Lister for Store<T, L> {
    fn new_list(&self) -> Value {
        let mut list = to_json(&Store::new_list(self)).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut list {
            map.insert("kind".to_string(), Value::String(list_kind(T::KIND)));
        }
        list
    }

    fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<Value, StatusError> {
        to_json(&Store::list(self, ctx, options)?)
    }
}

impl<T: Object, L: ObjectList<Item = T>> rest::Creater for Store<T, L> {
    fn create(&self, ctx: &RequestContext, object: Value) -> Result<Value, StatusError> {
        to_json(&Store::create(self, ctx, from_json(object)?)?)
    }
}

impl<T: Object, L: ObjectList<Item = T>> rest::Updater for Store<T, L> {
    fn update(&self, ctx: &RequestContext, name: &str, object: Value) -> Result<(Value, bool), StatusError> {
        let (updated, created) = Store::update(self, ctx, name, from_json(object)?)?;
        Ok((to_json(&updated)?, created))
    }
}

impl<T: Object, L: ObjectList<Item = T>> rest::Deleter for Store<T, L> {
    fn delete(&self, ctx: &RequestContext, name: &str, options: &DeleteOptions) -> Result<Value, StatusError> {
        to_json(&Store::delete(self, ctx, name, options)?)
    }
}

impl<T: Object, L: ObjectList<Item = T>> rest::Watcher for Store<T, L> {
    fn watch(&self, ctx: &RequestContext, options: &ListOptions) -> Result<WatchStream, StatusError> {
        Store::watch(self, ctx, options)
    }
}
