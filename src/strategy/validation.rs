//! Field-level validation errors and the generic metadata checks.

use std::fmt;

use serde_json::Value;

use crate::meta::ObjectMeta;

/// The category of a field validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldErrorType {
    Required,
    Invalid,
    Duplicate,
    Forbidden,
    NotSupported,
    TooLong,
}

impl FieldErrorType {
    /// Machine-readable reason, as used in `Status` causes.
    pub fn reason(&self) -> &'static str {
        match self {
            FieldErrorType::Required => "FieldValueRequired",
            FieldErrorType::Invalid => "FieldValueInvalid",
            FieldErrorType::Duplicate => "FieldValueDuplicate",
            FieldErrorType::Forbidden => "FieldValueForbidden",
            FieldErrorType::NotSupported => "FieldValueNotSupported",
            FieldErrorType::TooLong => "FieldValueTooLong",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldErrorType::Required => "Required value",
            FieldErrorType::Invalid => "Invalid value",
            FieldErrorType::Duplicate => "Duplicate value",
            FieldErrorType::Forbidden => "Forbidden",
            FieldErrorType::NotSupported => "Unsupported value",
            FieldErrorType::TooLong => "Too long",
        }
    }
}

/// A dotted path to a field, e.g. `spec.containers[0].name`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(root: impl Into<String>) -> Self {
        Self(root.into())
    }

    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    pub fn index(&self, i: usize) -> Self {
        Self(format!("{}[{}]", self.0, i))
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{}]", self.0, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single validation failure on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub error_type: FieldErrorType,
    pub field: String,
    pub bad_value: Option<Value>,
    pub detail: String,
}

impl FieldError {
    pub fn required(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: FieldErrorType::Required,
            field: path.to_string(),
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn invalid(path: &FieldPath, value: impl Into<Value>, detail: impl Into<String>) -> Self {
        Self {
            error_type: FieldErrorType::Invalid,
            field: path.to_string(),
            bad_value: Some(value.into()),
            detail: detail.into(),
        }
    }

    pub fn duplicate(path: &FieldPath, value: impl Into<Value>) -> Self {
        Self {
            error_type: FieldErrorType::Duplicate,
            field: path.to_string(),
            bad_value: Some(value.into()),
            detail: String::new(),
        }
    }

    pub fn forbidden(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self {
            error_type: FieldErrorType::Forbidden,
            field: path.to_string(),
            bad_value: None,
            detail: detail.into(),
        }
    }

    pub fn not_supported(path: &FieldPath, value: impl Into<Value>, valid: &[&str]) -> Self {
        Self {
            error_type: FieldErrorType::NotSupported,
            field: path.to_string(),
            bad_value: Some(value.into()),
            detail: format!("supported values: {}", valid.join(", ")),
        }
    }

    pub fn too_long(path: &FieldPath, value: impl Into<Value>, max: usize) -> Self {
        Self {
            error_type: FieldErrorType::TooLong,
            field: path.to_string(),
            bad_value: Some(value.into()),
            detail: format!("must have at most {} bytes", max),
        }
    }

    /// The message without the field prefix.
    pub fn message(&self) -> String {
        let mut msg = self.error_type.label().to_string();
        if let Some(value) = &self.bad_value {
            msg.push_str(&format!(": {}", value));
        }
        if !self.detail.is_empty() {
            msg.push_str(&format!(": {}", self.detail));
        }
        msg
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message())
    }
}

impl std::error::Error for FieldError {}

pub type FieldErrorList = Vec<FieldError>;

/// Checks a name is usable as a single URL path segment.
pub fn validate_path_segment_name(name: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if name == "." || name == ".." {
        problems.push(format!("may not be '{}'", name));
    }
    for illegal in ["/", "%"] {
        if name.contains(illegal) {
            problems.push(format!("may not contain '{}'", illegal));
        }
    }
    problems
}

/// Generic checks applied to every object's metadata before the strategy's own validation.
pub fn validate_object_meta(meta: &ObjectMeta, namespace_scoped: bool) -> FieldErrorList {
    let path = FieldPath::new("metadata");
    let mut errs = FieldErrorList::new();

    if meta.name.is_empty() {
        errs.push(FieldError::required(
            &path.child("name"),
            "name or generateName is required",
        ));
    } else {
        for problem in validate_path_segment_name(&meta.name) {
            errs.push(FieldError::invalid(
                &path.child("name"),
                meta.name.clone(),
                problem,
            ));
        }
    }

    if namespace_scoped {
        if meta.namespace.is_empty() {
            errs.push(FieldError::required(&path.child("namespace"), ""));
        } else {
            for problem in validate_path_segment_name(&meta.namespace) {
                errs.push(FieldError::invalid(
                    &path.child("namespace"),
                    meta.namespace.clone(),
                    problem,
                ));
            }
        }
    } else if !meta.namespace.is_empty() {
        errs.push(FieldError::forbidden(
            &path.child("namespace"),
            "not allowed on this type",
        ));
    }

    for key in meta.labels.keys() {
        if key.is_empty() {
            errs.push(FieldError::invalid(
                &path.child("labels"),
                key.clone(),
                "label keys must be non-empty",
            ));
        }
    }

    errs
}

/// Generic checks for updates: identity fields may not change.
pub fn validate_object_meta_update(
    new: &ObjectMeta,
    old: &ObjectMeta,
    namespace_scoped: bool,
) -> FieldErrorList {
    let path = FieldPath::new("metadata");
    let mut errs = validate_object_meta(new, namespace_scoped);

    if new.name != old.name {
        errs.push(FieldError::invalid(
            &path.child("name"),
            new.name.clone(),
            "field is immutable",
        ));
    }
    if new.namespace != old.namespace {
        errs.push(FieldError::invalid(
            &path.child("namespace"),
            new.namespace.clone(),
            "field is immutable",
        ));
    }
    if !new.uid.is_empty() && new.uid != old.uid {
        errs.push(FieldError::invalid(
            &path.child("uid"),
            new.uid.clone(),
            "field is immutable",
        ));
    }

    errs
}
