//! Generic Store - strategy-driven CRUD, list and watch over a backend.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::hooks::HookDispatcher;
use crate::error::{HookError, StatusError};
use crate::meta::{DeleteOptions, GroupResource, List, ListOptions, Object, ObjectList, ObjectMeta};
use crate::request::RequestContext;
use crate::storage::{
    clear_resource_version, set_resource_version, Backend, BackendError, FieldSelector,
    LabelSelector, RestOptions, SelectionPredicate, StoredObject, WatchStream,
};
use crate::strategy::{
    validate_object_meta, validate_object_meta_update, validate_path_segment_name,
    CreateStrategy, DeleteStrategy, FieldError, FieldErrorList, FieldPath, UpdateStrategy,
};

/// Constructs an empty object.
pub type NewFunc<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Constructs an empty list.
pub type NewListFunc<L> = Arc<dyn Fn() -> L + Send + Sync>;

/// Called with the committed object after a successful mutation.
pub type AfterHook<T> = Arc<dyn Fn(&T) -> Result<(), HookError> + Send + Sync>;

const CONFLICT_MESSAGE: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

/// The immutable part of a store, shared by every store built from one factory.
pub(crate) struct StoreFuncs<T: Object, L> {
    pub new_func: NewFunc<T>,
    pub new_list_func: NewListFunc<L>,
    pub create_strategy: Arc<dyn CreateStrategy<T>>,
    pub update_strategy: Arc<dyn UpdateStrategy<T>>,
    pub delete_strategy: Arc<dyn DeleteStrategy<T>>,
    pub after_create: Option<AfterHook<T>>,
    pub after_update: Option<AfterHook<T>>,
    pub after_delete: Option<AfterHook<T>>,
}

/// A CRUD + list + watch store for one resource type.
///
/// Objects are kept in the backend as JSON without their resource version;
/// the backend revision is stamped into `metadata.resourceVersion` on every
/// read, so each call returns a freshly decoded object.
///
/// Build one with [`StorageBuilder`](crate::StorageBuilder).
pub struct Store<T: Object, L: ObjectList<Item = T> = List<T>> {
    funcs: Arc<StoreFuncs<T, L>>,
    qualified_resource: GroupResource,
    backend: Arc<dyn Backend>,
    prefix: String,
    hooks: HookDispatcher,
}

impl<T: Object, L: ObjectList<Item = T>> Store<T, L> {
    pub(crate) fn new(
        funcs: Arc<StoreFuncs<T, L>>,
        qualified_resource: GroupResource,
        options: RestOptions,
    ) -> Self {
        Self {
            funcs,
            qualified_resource,
            backend: options.backend,
            prefix: options.resource_prefix.trim_end_matches('/').to_string(),
            hooks: HookDispatcher::spawn(),
        }
    }

    pub fn qualified_resource(&self) -> &GroupResource {
        &self.qualified_resource
    }

    pub fn namespace_scoped(&self) -> bool {
        self.funcs.create_strategy.namespace_scoped()
    }

    pub fn new_object(&self) -> T {
        (self.funcs.new_func)()
    }

    pub fn new_list(&self) -> L {
        (self.funcs.new_list_func)()
    }

    /// Persist a new object.
    pub fn create(&self, ctx: &RequestContext, mut obj: T) -> Result<T, StatusError> {
        ctx.check()?;
        let strategy = &self.funcs.create_strategy;
        let scoped = strategy.namespace_scoped();
        self.fill_namespace(ctx, obj.metadata_mut(), scoped)?;

        {
            let meta = obj.metadata_mut();
            meta.resource_version.clear();
            if meta.name.is_empty() && !meta.generate_name.is_empty() {
                meta.name = strategy.generate_name(&meta.generate_name);
            }
            meta.uid = Uuid::new_v4().to_string();
            meta.creation_timestamp = Some(Utc::now());
        }

        strategy.prepare_for_create(ctx, &mut obj);
        let mut errs = validate_object_meta(obj.metadata(), scoped);
        errs.extend(strategy.validate(ctx, &obj));
        if !errs.is_empty() {
            return Err(self.invalid(&obj, errs));
        }
        strategy.canonicalize(&mut obj);

        let name = obj.metadata().name.clone();
        let key = self.object_key(&obj.metadata().namespace, &name)?;
        let value = encode(&obj)?;

        ctx.check()?;
        let stored = self
            .backend
            .create(&key, value)
            .map_err(|e| self.backend_error(&name, e))?;
        let created = self.decode(stored)?;

        tracing::debug!(resource = %self.qualified_resource, %key, "created");
        self.after("after-create", &self.funcs.after_create, &created);
        Ok(created)
    }

    /// Replace the named object. Returns the stored object and whether it was created.
    pub fn update(&self, ctx: &RequestContext, name: &str, mut obj: T) -> Result<(T, bool), StatusError> {
        ctx.check()?;
        let strategy = &self.funcs.update_strategy;
        let scoped = strategy.namespace_scoped();
        self.fill_namespace(ctx, obj.metadata_mut(), scoped)?;

        if obj.metadata().name.is_empty() {
            obj.metadata_mut().name = name.to_string();
        } else if obj.metadata().name != name {
            return Err(StatusError::BadRequest(format!(
                "the name of the object ({}) does not match the name on the URL ({})",
                obj.metadata().name,
                name
            )));
        }

        let key = self.object_key(&obj.metadata().namespace, name)?;
        ctx.check()?;
        let existing = self
            .backend
            .get(&key)
            .map_err(|e| self.backend_error(name, e))?;

        let StoredObject {
            value: old_value,
            version,
            ..
        } = match existing {
            Some(existing) => existing,
            None if strategy.allow_create_on_update() => {
                // Losing a create race to another writer is a retryable conflict.
                return match self.create(ctx, obj) {
                    Ok(created) => Ok((created, true)),
                    Err(StatusError::AlreadyExists { .. }) => Err(self.conflict(name)),
                    Err(err) => Err(err),
                };
            }
            None => return Err(self.not_found(name)),
        };
        let old = self.decode_value(old_value.clone(), version)?;

        let unconditional = strategy.allow_unconditional_update();
        let supplied = obj.metadata().resource_version.clone();
        if supplied.is_empty() {
            if !unconditional {
                let causes = vec![FieldError::required(
                    &FieldPath::new("metadata").child("resourceVersion"),
                    "must be specified for an update",
                )];
                return Err(self.invalid(&obj, causes));
            }
        } else if parse_resource_version(&supplied)? != version && !unconditional {
            return Err(self.conflict(name));
        }

        {
            let meta = obj.metadata_mut();
            meta.uid = old.metadata().uid.clone();
            meta.creation_timestamp = old.metadata().creation_timestamp;
            meta.resource_version.clear();
        }

        strategy.prepare_for_update(ctx, &mut obj, &old);
        let mut errs = validate_object_meta_update(obj.metadata(), old.metadata(), scoped);
        errs.extend(strategy.validate_update(ctx, &obj, &old));
        if !errs.is_empty() {
            return Err(self.invalid(&obj, errs));
        }
        strategy.canonicalize(&mut obj);

        let value = encode(&obj)?;
        if value == old_value {
            tracing::debug!(resource = %self.qualified_resource, %key, "update is a no-op");
            return Ok((old, false));
        }

        ctx.check()?;
        let stored = self
            .backend
            .update(&key, value, version)
            .map_err(|e| self.backend_error(name, e))?;
        let updated = self.decode(stored)?;

        tracing::debug!(resource = %self.qualified_resource, %key, "updated");
        self.after("after-update", &self.funcs.after_update, &updated);
        Ok((updated, false))
    }

    /// Delete the named object and return its last state.
    pub fn delete(
        &self,
        ctx: &RequestContext,
        name: &str,
        options: &DeleteOptions,
    ) -> Result<T, StatusError> {
        ctx.check()?;
        let scoped = self.funcs.delete_strategy.namespace_scoped();
        let key = self.request_key(ctx, name, scoped)?;
        let existing = self
            .backend
            .get(&key)
            .map_err(|e| self.backend_error(name, e))?
            .ok_or_else(|| self.not_found(name))?;

        let mut expected = None;
        if let Some(preconditions) = &options.preconditions {
            if let Some(uid) = &preconditions.uid {
                let actual = existing
                    .value
                    .pointer("/metadata/uid")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if uid != actual {
                    return Err(StatusError::Conflict {
                        resource: self.qualified_resource.clone(),
                        name: name.to_string(),
                        message: format!(
                            "Precondition failed: UID in precondition: {}, UID in object meta: {}",
                            uid, actual
                        ),
                    });
                }
                expected = Some(existing.version);
            }
            if let Some(rv) = &preconditions.resource_version {
                if parse_resource_version(rv)? != existing.version {
                    return Err(StatusError::Conflict {
                        resource: self.qualified_resource.clone(),
                        name: name.to_string(),
                        message: format!(
                            "Precondition failed: ResourceVersion in precondition: {}, ResourceVersion in object meta: {}",
                            rv, existing.version
                        ),
                    });
                }
                expected = Some(existing.version);
            }
        }

        ctx.check()?;
        let removed = self
            .backend
            .delete(&key, expected)
            .map_err(|e| self.backend_error(name, e))?;
        let deleted = self.decode(removed)?;

        tracing::debug!(resource = %self.qualified_resource, %key, "deleted");
        self.after("after-delete", &self.funcs.after_delete, &deleted);
        Ok(deleted)
    }

    pub fn get(&self, ctx: &RequestContext, name: &str) -> Result<T, StatusError> {
        ctx.check()?;
        let key = self.request_key(ctx, name, self.namespace_scoped())?;
        let stored = self
            .backend
            .get(&key)
            .map_err(|e| self.backend_error(name, e))?
            .ok_or_else(|| self.not_found(name))?;
        self.decode(stored)
    }

    /// List objects in the request namespace, or in every namespace when it has none.
    pub fn list(&self, ctx: &RequestContext, options: &ListOptions) -> Result<L, StatusError> {
        ctx.check()?;
        let predicate = predicate_for(options)?;
        let prefix = self.list_prefix(ctx);
        let page = self
            .backend
            .list(&prefix, &predicate)
            .map_err(|e| self.backend_error("", e))?;

        let items = page
            .items
            .into_iter()
            .map(|stored| self.decode(stored))
            .collect::<Result<Vec<T>, StatusError>>()?;

        let mut list = self.new_list();
        list.set_items(items);
        let meta = list.list_meta_mut();
        meta.resource_version = page.version.to_string();
        meta.continue_token = page.continue_token.unwrap_or_default();
        meta.remaining_item_count = page.remaining;
        Ok(list)
    }

    /// Watch objects in the request namespace.
    ///
    /// An empty or `"0"` resource version starts with the current state.
    pub fn watch(&self, ctx: &RequestContext, options: &ListOptions) -> Result<WatchStream, StatusError> {
        ctx.check()?;
        let mut predicate = predicate_for(options)?;
        predicate.limit = None;
        predicate.continue_token = None;

        let from = match options.resource_version.as_deref() {
            None | Some("") | Some("0") => None,
            Some(rv) => Some(parse_resource_version(rv)?),
        };
        self.backend
            .watch(&self.list_prefix(ctx), predicate, from)
            .map_err(|e| self.backend_error("", e))
    }

    fn after(&self, hook: &'static str, func: &Option<AfterHook<T>>, obj: &T) {
        if let Some(func) = func {
            let func = Arc::clone(func);
            let obj = obj.clone();
            self.hooks.dispatch(
                hook,
                self.qualified_resource.to_string(),
                obj.metadata().name.clone(),
                move || func(&obj),
            );
        }
    }

    fn fill_namespace(
        &self,
        ctx: &RequestContext,
        meta: &mut ObjectMeta,
        scoped: bool,
    ) -> Result<(), StatusError> {
        if !scoped {
            meta.namespace.clear();
            return Ok(());
        }
        let namespace = ctx.namespace_value().ok_or_else(|| {
            StatusError::BadRequest(format!(
                "a namespace is required for {}",
                self.qualified_resource
            ))
        })?;
        if meta.namespace.is_empty() {
            meta.namespace = namespace.to_string();
        } else if meta.namespace != namespace {
            return Err(StatusError::BadRequest(
                "the namespace of the provided object does not match the namespace sent on the request"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn request_key(&self, ctx: &RequestContext, name: &str, scoped: bool) -> Result<String, StatusError> {
        if !scoped {
            return self.object_key("", name);
        }
        let namespace = ctx.namespace_value().ok_or_else(|| {
            StatusError::BadRequest(format!(
                "a namespace is required for {}",
                self.qualified_resource
            ))
        })?;
        self.object_key(namespace, name)
    }

    fn object_key(&self, namespace: &str, name: &str) -> Result<String, StatusError> {
        if name.is_empty() {
            return Err(StatusError::BadRequest("name parameter required".to_string()));
        }
        if let Some(problem) = validate_path_segment_name(name).into_iter().next() {
            return Err(StatusError::BadRequest(format!("name {:?} {}", name, problem)));
        }
        Ok(if namespace.is_empty() {
            format!("{}/{}", self.prefix, name)
        } else {
            format!("{}/{}/{}", self.prefix, namespace, name)
        })
    }

    fn list_prefix(&self, ctx: &RequestContext) -> String {
        match ctx.namespace_value() {
            Some(namespace) if self.namespace_scoped() => {
                format!("{}/{}/", self.prefix, namespace)
            }
            _ => format!("{}/", self.prefix),
        }
    }

    fn decode(&self, stored: StoredObject) -> Result<T, StatusError> {
        self.decode_value(stored.value, stored.version)
    }

    fn decode_value(&self, mut value: Value, version: u64) -> Result<T, StatusError> {
        set_resource_version(&mut value, version);
        serde_json::from_value(value).map_err(|e| {
            StatusError::Internal(format!(
                "decoding stored {}: {}",
                self.qualified_resource, e
            ))
        })
    }

    fn invalid(&self, obj: &T, causes: FieldErrorList) -> StatusError {
        StatusError::Invalid {
            resource: self.qualified_resource.clone(),
            kind: T::KIND.to_string(),
            name: obj.metadata().name.clone(),
            causes,
        }
    }

    fn not_found(&self, name: &str) -> StatusError {
        StatusError::NotFound {
            resource: self.qualified_resource.clone(),
            name: name.to_string(),
        }
    }

    fn conflict(&self, name: &str) -> StatusError {
        StatusError::Conflict {
            resource: self.qualified_resource.clone(),
            name: name.to_string(),
            message: CONFLICT_MESSAGE.to_string(),
        }
    }

    fn backend_error(&self, name: &str, err: BackendError) -> StatusError {
        match err {
            BackendError::NotFound { .. } => self.not_found(name),
            BackendError::AlreadyExists { .. } => StatusError::AlreadyExists {
                resource: self.qualified_resource.clone(),
                name: name.to_string(),
            },
            BackendError::Conflict { .. } => self.conflict(name),
            BackendError::Unavailable(message) => StatusError::ServiceUnavailable(message),
            BackendError::TooOldResourceVersion { requested, oldest } => StatusError::Gone(format!(
                "{} (oldest available is {})",
                requested, oldest
            )),
            BackendError::InvalidContinue(message) => {
                StatusError::BadRequest(format!("invalid continue token: {}", message))
            }
            err @ BackendError::LockPoisoned(_) => StatusError::Internal(err.to_string()),
        }
    }
}

fn encode<T: Object>(obj: &T) -> Result<Value, StatusError> {
    let mut value = serde_json::to_value(obj)
        .map_err(|e| StatusError::Internal(format!("encoding {}: {}", T::KIND, e)))?;
    clear_resource_version(&mut value);
    Ok(value)
}

fn parse_resource_version(rv: &str) -> Result<u64, StatusError> {
    rv.parse()
        .map_err(|_| StatusError::BadRequest(format!("invalid resource version {:?}", rv)))
}

fn predicate_for(options: &ListOptions) -> Result<SelectionPredicate, StatusError> {
    let label = match options.label_selector.as_deref() {
        Some(selector) => LabelSelector::parse(selector).map_err(StatusError::BadRequest)?,
        None => LabelSelector::everything(),
    };
    let field = match options.field_selector.as_deref() {
        Some(selector) => FieldSelector::parse(selector).map_err(StatusError::BadRequest)?,
        None => FieldSelector::everything(),
    };
    Ok(SelectionPredicate {
        label,
        field,
        limit: options.limit.filter(|l| *l > 0),
        continue_token: options.continue_token.clone().filter(|t| !t.is_empty()),
    })
}
