//! Scaffolding for resource API servers.
//!
//! Register typed resources with an [`ApiServerBase`] and get create, read,
//! update, delete, list and watch over HTTP, discovery documents and
//! optimistic concurrency from a generic [`Store`].
//!
//! ```ignore
//! use apiserver_runtime::{ApiServerBase, GroupVersionResource, List, Object, ObjectMeta, StorageBuilder};
//!
//! #[derive(Clone, Default, Serialize, Deserialize, Object)]
//! #[object(kind = "Demo")]
//! struct Demo {
//!     #[serde(default)]
//!     metadata: ObjectMeta,
//! }
//!
//! let mut base = ApiServerBase::new();
//! base.with_scheme(&[install])?.with_store(
//!     GroupVersionResource::new("examples.k8s.io", "v1", "demos"),
//!     StorageBuilder::<Demo>::new()
//!         .with_new_func(Demo::default)
//!         .with_new_list_func(List::default)
//!         .build(),
//! )?;
//! base.run().await?;
//! ```

pub mod builder;
pub mod error;
pub mod logging;
pub mod meta;
pub mod registry;
pub mod request;
pub mod rest;
pub mod scheme;
pub mod server;
pub mod storage;
pub mod strategy;

pub use builder::{StorageBuilder, StorageFactory, StoreFactory};
pub use error::{ConfigError, HookError, ServerError, StatusError};
pub use meta::{
    DeleteOptions, GetOptions, GroupResource, GroupVersion, GroupVersionKind,
    GroupVersionResource, List, ListMeta, ListOptions, Object, ObjectList, ObjectMeta, Status,
};
pub use registry::Store;
pub use request::{RequestContext, UserInfo};
pub use scheme::{Scheme, SchemeInstaller};
pub use server::{ApiServerBase, BaseServerOptions, Stage};
pub use strategy::{
    CreateStrategy, DefaultStrategy, DeleteStrategy, FieldError, FieldErrorList, FieldPath,
    UpdateStrategy,
};

// Derive macro for `Object`; shares the trait's name in the macro namespace.
pub use apiserver_runtime_macros::Object;
