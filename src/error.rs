//! Error types.
//!
//! - [`ConfigError`]: startup-time failures. Fatal; the server never starts.
//! - [`StatusError`]: request-time failures, rendered to clients as `Status` objects.
//! - [`ServerError`]: failures of the run loop.

use thiserror::Error;

use crate::meta::{GroupResource, GroupVersion, GroupVersionResource, Status, StatusCause, StatusDetails};
use crate::storage::BackendError;
use crate::strategy::FieldErrorList;

/// Error type for post-mutation hooks. Hook errors are logged, never returned to callers.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration errors raised while registering resources or completing the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A resource identifier was registered twice.
    #[error("attempting to add duplicate storage for {0}")]
    DuplicateStorage(GroupVersionResource),
    /// Two bindings folded into the same group/version/resource slot.
    #[error("duplicate resource {resource:?} in {group_version}")]
    DuplicateResource {
        group_version: GroupVersion,
        resource: String,
    },
    /// A store was finalized without a required constructor.
    #[error("store for {resource} is incomplete: {field} must be set")]
    IncompleteStore {
        resource: GroupResource,
        field: &'static str,
    },
    /// One or more option objects failed validation.
    #[error("invalid options: {}", .0.join("; "))]
    InvalidOptions(Vec<String>),
    /// An option object failed to apply itself to the config.
    #[error("applying {option} options: {message}")]
    Apply { option: String, message: String },
    /// The persistence backend could not be obtained.
    #[error("storage backend: {0}")]
    Backend(#[from] BackendError),
    /// An API group could not be installed into the generic server.
    #[error("unable to install API group {group:?}: {reason}")]
    Install { group: String, reason: String },
    /// Registration was attempted after the config was completed.
    #[error("cannot register {0} after the configuration has been completed")]
    RegistrationClosed(String),
}

/// Errors from running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("server i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request-time errors. Each maps to an HTTP status code and a `Status` reason.
#[derive(Debug, Clone, Error)]
pub enum StatusError {
    #[error("{resource} {name:?} not found")]
    NotFound { resource: GroupResource, name: String },
    #[error("{resource} {name:?} already exists")]
    AlreadyExists { resource: GroupResource, name: String },
    /// Optimistic concurrency failure. Re-read and retry.
    #[error("Operation cannot be fulfilled on {resource} {name:?}: {message}")]
    Conflict {
        resource: GroupResource,
        name: String,
        message: String,
    },
    /// Validation failed. `causes` holds every field error, in the order produced.
    #[error("{kind} {name:?} is invalid: {}", join_causes(.causes))]
    Invalid {
        resource: GroupResource,
        kind: String,
        name: String,
        causes: FieldErrorList,
    },
    #[error("{0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{verb} is not supported on resources of kind {resource}")]
    MethodNotSupported { resource: GroupResource, verb: String },
    /// A watch asked for a version older than the server retains.
    #[error("too old resource version: {0}")]
    Gone(String),
    #[error("request canceled: {0}")]
    Canceled(String),
    #[error("timeout: {0}")]
    Timeout(String),
    /// Transient backend failure. Safe to retry.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

fn join_causes(causes: &FieldErrorList) -> String {
    let parts: Vec<String> = causes.iter().map(|c| c.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

impl StatusError {
    /// Map this error to an HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            StatusError::NotFound { .. } => 404,
            StatusError::AlreadyExists { .. } => 409,
            StatusError::Conflict { .. } => 409,
            StatusError::Invalid { .. } => 422,
            StatusError::BadRequest(_) => 400,
            StatusError::Unauthorized(_) => 401,
            StatusError::Forbidden(_) => 403,
            StatusError::MethodNotSupported { .. } => 405,
            StatusError::Gone(_) => 410,
            StatusError::Canceled(_) => 499,
            StatusError::Timeout(_) => 504,
            StatusError::ServiceUnavailable(_) => 503,
            StatusError::Internal(_) => 500,
        }
    }

    /// Machine-readable reason for the `Status` object.
    pub fn reason(&self) -> &'static str {
        match self {
            StatusError::NotFound { .. } => "NotFound",
            StatusError::AlreadyExists { .. } => "AlreadyExists",
            StatusError::Conflict { .. } => "Conflict",
            StatusError::Invalid { .. } => "Invalid",
            StatusError::BadRequest(_) => "BadRequest",
            StatusError::Unauthorized(_) => "Unauthorized",
            StatusError::Forbidden(_) => "Forbidden",
            StatusError::MethodNotSupported { .. } => "MethodNotAllowed",
            StatusError::Gone(_) => "Expired",
            StatusError::Canceled(_) => "Canceled",
            StatusError::Timeout(_) => "Timeout",
            StatusError::ServiceUnavailable(_) => "ServiceUnavailable",
            StatusError::Internal(_) => "InternalError",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StatusError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StatusError::Conflict { .. })
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, StatusError::Invalid { .. })
    }

    /// Render as a `Status` object.
    pub fn to_status(&self) -> Status {
        let details = match self {
            StatusError::NotFound { resource, name }
            | StatusError::AlreadyExists { resource, name }
            | StatusError::Conflict { resource, name, .. } => Some(StatusDetails {
                name: name.clone(),
                group: resource.group.clone(),
                kind: resource.resource.clone(),
                causes: Vec::new(),
            }),
            StatusError::Invalid {
                resource,
                kind,
                name,
                causes,
            } => Some(StatusDetails {
                name: name.clone(),
                group: resource.group.clone(),
                kind: kind.clone(),
                causes: causes
                    .iter()
                    .map(|c| StatusCause {
                        reason: c.error_type.reason().to_string(),
                        message: c.message(),
                        field: c.field.clone(),
                    })
                    .collect(),
            }),
            StatusError::MethodNotSupported { resource, .. } => Some(StatusDetails {
                group: resource.group.clone(),
                kind: resource.resource.clone(),
                ..StatusDetails::default()
            }),
            _ => None,
        };

        Status::failure(self.status_code(), self.reason(), self.to_string(), details)
    }
}
