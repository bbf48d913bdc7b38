//! Strategies - per-type create / update / delete policy for the generic store.
//!
//! A strategy decides scope, name generation, how objects are normalized
//! before they are persisted, what makes them valid, and how strict updates
//! are about resource versions.
//!
//! ## Example
//!
//! ```ignore
//! struct DemoStrategy;
//!
//! impl CreateStrategy<Demo> for DemoStrategy {
//!     fn namespace_scoped(&self) -> bool { true }
//!
//!     fn validate(&self, _ctx: &RequestContext, obj: &Demo) -> FieldErrorList {
//!         let mut errs = FieldErrorList::new();
//!         if obj.spec.size > 10 {
//!             errs.push(FieldError::invalid(&FieldPath::new("spec").child("size"), obj.spec.size, "must be at most 10"));
//!         }
//!         errs
//!     }
//! }
//! ```

mod names;
mod validation;

use crate::meta::Object;
use crate::request::RequestContext;

pub use names::simple_name;
pub use validation::{
    validate_object_meta, validate_object_meta_update, validate_path_segment_name, FieldError,
    FieldErrorList, FieldErrorType, FieldPath,
};

/// Policy for creating objects of type `T`.
pub trait CreateStrategy<T: Object>: Send + Sync {
    /// Whether objects live inside a namespace.
    fn namespace_scoped(&self) -> bool;

    /// Produce a name from `metadata.generateName`.
    fn generate_name(&self, base: &str) -> String {
        simple_name(base)
    }

    /// Normalize the object before validation (clear status, set defaults).
    fn prepare_for_create(&self, _ctx: &RequestContext, _obj: &mut T) {}

    /// Validate a new object. An empty list means valid.
    fn validate(&self, _ctx: &RequestContext, _obj: &T) -> FieldErrorList {
        FieldErrorList::new()
    }

    /// Final normalization after validation passes.
    fn canonicalize(&self, _obj: &mut T) {}
}

/// Policy for updating objects of type `T`.
pub trait UpdateStrategy<T: Object>: Send + Sync {
    fn namespace_scoped(&self) -> bool;

    /// Whether an update of a missing object creates it.
    fn allow_create_on_update(&self) -> bool;

    /// Normalize the new object against the old one (e.g. preserve status).
    fn prepare_for_update(&self, _ctx: &RequestContext, _obj: &mut T, _old: &T) {}

    fn validate_update(&self, _ctx: &RequestContext, _obj: &T, _old: &T) -> FieldErrorList {
        FieldErrorList::new()
    }

    fn canonicalize(&self, _obj: &mut T) {}

    /// Whether an update may skip the resource version check.
    fn allow_unconditional_update(&self) -> bool;
}

/// Policy for deleting objects of type `T`.
pub trait DeleteStrategy<T: Object>: Send + Sync {
    fn namespace_scoped(&self) -> bool;
}

/// Strategy with no restrictions beyond scope.
///
/// Updates must carry the current resource version and may not create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultStrategy {
    namespace_scoped: bool,
}

impl DefaultStrategy {
    pub fn namespaced() -> Self {
        Self {
            namespace_scoped: true,
        }
    }

    pub fn cluster_scoped() -> Self {
        Self {
            namespace_scoped: false,
        }
    }
}

impl Default for DefaultStrategy {
    fn default() -> Self {
        Self::namespaced()
    }
}

impl<T: Object> CreateStrategy<T> for DefaultStrategy {
    fn namespace_scoped(&self) -> bool {
        self.namespace_scoped
    }
}

impl<T: Object> UpdateStrategy<T> for DefaultStrategy {
    fn namespace_scoped(&self) -> bool {
        self.namespace_scoped
    }

    fn allow_create_on_update(&self) -> bool {
        false
    }

    fn allow_unconditional_update(&self) -> bool {
        false
    }
}

impl<T: Object> DeleteStrategy<T> for DefaultStrategy {
    fn namespace_scoped(&self) -> bool {
        self.namespace_scoped
    }
}
