//! Test domain: a `Demo` object served by a generic store.

#![allow(dead_code)]

use apiserver_runtime::storage::InMemoryRestOptionsGetter;
use apiserver_runtime::{
    CreateStrategy, FieldError, FieldErrorList, FieldPath, GroupResource, List, Object,
    ObjectMeta, RequestContext, Store, StorageBuilder, UpdateStrategy,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoSpec {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub replicas: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Object)]
#[object(kind = "Demo")]
pub struct Demo {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DemoSpec,
}

impl Demo {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: DemoSpec {
                message: message.to_string(),
                replicas: 1,
            },
        }
    }

    pub fn labeled(mut self, key: &str, value: &str) -> Self {
        self.metadata = self.metadata.with_label(key, value);
        self
    }
}

pub fn resource() -> GroupResource {
    GroupResource::new("examples.k8s.io", "demos")
}

pub fn ctx(namespace: &str) -> RequestContext {
    RequestContext::with_namespace(namespace)
}

pub fn builder() -> StorageBuilder<Demo> {
    StorageBuilder::<Demo>::new()
        .with_new_func(Demo::default)
        .with_new_list_func(List::default)
}

/// A store with default strategies over a fresh in-memory backend.
pub fn demo_store() -> Store<Demo> {
    store_from(builder())
}

pub fn store_from(builder: StorageBuilder<Demo>) -> Store<Demo> {
    let getter = InMemoryRestOptionsGetter::new("/registry");
    builder.build().new_store(resource(), &getter).unwrap()
}

/// Updates skip the version check.
pub struct Unconditional;

impl UpdateStrategy<Demo> for Unconditional {
    fn namespace_scoped(&self) -> bool {
        true
    }

    fn allow_create_on_update(&self) -> bool {
        true
    }

    fn allow_unconditional_update(&self) -> bool {
        true
    }
}

/// Requires a message and a positive replica count.
pub struct Strict;

impl CreateStrategy<Demo> for Strict {
    fn namespace_scoped(&self) -> bool {
        true
    }

    fn validate(&self, _ctx: &RequestContext, obj: &Demo) -> FieldErrorList {
        let spec = FieldPath::new("spec");
        let mut errs = FieldErrorList::new();
        if obj.spec.message.is_empty() {
            errs.push(FieldError::required(&spec.child("message"), "must not be empty"));
        }
        if obj.spec.replicas < 1 {
            errs.push(FieldError::invalid(
                &spec.child("replicas"),
                obj.spec.replicas,
                "must be at least 1",
            ));
        }
        errs
    }
}
