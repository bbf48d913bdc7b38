//! StorageBuilder - declare a generic store, then finalize it per resource.
//!
//! ## Example
//!
//! ```ignore
//! let factory = StorageBuilder::<Demo>::new()
//!     .with_new_func(Demo::default)
//!     .with_new_list_func(List::default)
//!     .with_create_strategy(DemoStrategy)
//!     .with_update_strategy(DemoStrategy)
//!     .with_after_create_hook(|demo: &Demo| {
//!         tracing::info!(name = %demo.metadata.name, "demo created");
//!         Ok(())
//!     })
//!     .build();
//!
//! let store = factory.new_store(GroupResource::new("examples.k8s.io", "demos"), &getter)?;
//! ```

use std::sync::Arc;

use crate::error::{ConfigError, HookError};
use crate::meta::{GroupResource, List, Object, ObjectList};
use crate::registry::{AfterHook, NewFunc, NewListFunc, Store, StoreFuncs};
use crate::rest;
use crate::storage::RestOptionsGetter;
use crate::strategy::{CreateStrategy, DefaultStrategy, DeleteStrategy, UpdateStrategy};

/// Fluent accumulator for a generic store. Every setter replaces one field.
pub struct StorageBuilder<T: Object, L: ObjectList<Item = T> = List<T>> {
    new_func: Option<NewFunc<T>>,
    new_list_func: Option<NewListFunc<L>>,
    create_strategy: Option<Arc<dyn CreateStrategy<T>>>,
    update_strategy: Option<Arc<dyn UpdateStrategy<T>>>,
    delete_strategy: Option<Arc<dyn DeleteStrategy<T>>>,
    after_create: Option<AfterHook<T>>,
    after_update: Option<AfterHook<T>>,
    after_delete: Option<AfterHook<T>>,
}

impl<T: Object, L: ObjectList<Item = T>> Default for StorageBuilder<T, L> {
    fn default() -> Self {
        Self {
            new_func: None,
            new_list_func: None,
            create_strategy: None,
            update_strategy: None,
            delete_strategy: None,
            after_create: None,
            after_update: None,
            after_delete: None,
        }
    }
}

impl<T: Object, L: ObjectList<Item = T>> StorageBuilder<T, L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_new_func<F>(mut self, f: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.new_func = Some(Arc::new(f));
        self
    }

    pub fn with_new_list_func<F>(mut self, f: F) -> Self
    where
        F: Fn() -> L + Send + Sync + 'static,
    {
        self.new_list_func = Some(Arc::new(f));
        self
    }

    pub fn with_create_strategy<S: CreateStrategy<T> + 'static>(mut self, strategy: S) -> Self {
        self.create_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_update_strategy<S: UpdateStrategy<T> + 'static>(mut self, strategy: S) -> Self {
        self.update_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_delete_strategy<S: DeleteStrategy<T> + 'static>(mut self, strategy: S) -> Self {
        self.delete_strategy = Some(Arc::new(strategy));
        self
    }

    pub fn with_after_create_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.after_create = Some(Arc::new(hook));
        self
    }

    pub fn with_after_update_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.after_update = Some(Arc::new(hook));
        self
    }

    pub fn with_after_delete_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.after_delete = Some(Arc::new(hook));
        self
    }

    /// Freeze the builder. Missing constructors are reported when the factory runs.
    pub fn build(self) -> StoreFactory<T, L> {
        StoreFactory {
            new_func: self.new_func,
            new_list_func: self.new_list_func,
            create_strategy: self.create_strategy,
            update_strategy: self.update_strategy,
            delete_strategy: self.delete_strategy,
            after_create: self.after_create,
            after_update: self.after_update,
            after_delete: self.after_delete,
        }
    }
}

/// The frozen result of a [`StorageBuilder`].
///
/// Each call to [`new_store`](Self::new_store) yields an independent store.
pub struct StoreFactory<T: Object, L: ObjectList<Item = T> = List<T>> {
    new_func: Option<NewFunc<T>>,
    new_list_func: Option<NewListFunc<L>>,
    create_strategy: Option<Arc<dyn CreateStrategy<T>>>,
    update_strategy: Option<Arc<dyn UpdateStrategy<T>>>,
    delete_strategy: Option<Arc<dyn DeleteStrategy<T>>>,
    after_create: Option<AfterHook<T>>,
    after_update: Option<AfterHook<T>>,
    after_delete: Option<AfterHook<T>>,
}

impl<T: Object, L: ObjectList<Item = T>> Clone for StoreFactory<T, L> {
    fn clone(&self) -> Self {
        Self {
            new_func: self.new_func.clone(),
            new_list_func: self.new_list_func.clone(),
            create_strategy: self.create_strategy.clone(),
            update_strategy: self.update_strategy.clone(),
            delete_strategy: self.delete_strategy.clone(),
            after_create: self.after_create.clone(),
            after_update: self.after_update.clone(),
            after_delete: self.after_delete.clone(),
        }
    }
}

impl<T: Object, L: ObjectList<Item = T>> StoreFactory<T, L> {
    /// Finalize a store for `resource`, obtaining its backend from `getter`.
    pub fn new_store(
        &self,
        resource: GroupResource,
        getter: &dyn RestOptionsGetter,
    ) -> Result<Store<T, L>, ConfigError> {
        let new_func = self.new_func.clone().ok_or_else(|| ConfigError::IncompleteStore {
            resource: resource.clone(),
            field: "new_func",
        })?;
        let new_list_func = self
            .new_list_func
            .clone()
            .ok_or_else(|| ConfigError::IncompleteStore {
                resource: resource.clone(),
                field: "new_list_func",
            })?;

        let options = getter.get_rest_options(&resource)?;
        tracing::debug!(%resource, prefix = %options.resource_prefix, "finalized store");

        let funcs = StoreFuncs {
            new_func,
            new_list_func,
            create_strategy: self
                .create_strategy
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultStrategy::default())),
            update_strategy: self
                .update_strategy
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultStrategy::default())),
            delete_strategy: self
                .delete_strategy
                .clone()
                .unwrap_or_else(|| Arc::new(DefaultStrategy::default())),
            after_create: self.after_create.clone(),
            after_update: self.after_update.clone(),
            after_delete: self.after_delete.clone(),
        };

        Ok(Store::new(Arc::new(funcs), resource, options))
    }
}

/// Anything that can produce a REST storage once a backend is available.
pub trait StorageFactory: Send + Sync {
    fn new_storage(
        &self,
        resource: GroupResource,
        getter: &dyn RestOptionsGetter,
    ) -> Result<Arc<dyn rest::Storage>, ConfigError>;
}

impl<T: Object, L: ObjectList<Item = T>> StorageFactory for StoreFactory<T, L> {
    fn new_storage(
        &self,
        resource: GroupResource,
        getter: &dyn RestOptionsGetter,
    ) -> Result<Arc<dyn rest::Storage>, ConfigError> {
        Ok(Arc::new(self.new_store(resource, getter)?))
    }
}
