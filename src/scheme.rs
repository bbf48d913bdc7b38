//! Scheme - the registry of known kinds, and the JSON codecs built from it.
//!
//! Every scheme starts with the meta kinds (`Status`, discovery documents
//! and request options). API groups add their kinds through installer
//! functions:
//!
//! ```ignore
//! fn install(scheme: &mut Scheme) {
//!     scheme.add_known_types(&GroupVersion::new("examples.k8s.io", "v1"), &["Demo"]);
//! }
//!
//! let scheme = Scheme::from_installers(&[install]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::extract::Query;
use axum::http::Uri;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::StatusError;
use crate::meta::{list_kind, GroupVersion, GroupVersionKind};

/// Installs kinds into a scheme.
pub type SchemeInstaller = fn(&mut Scheme);

const UNVERSIONED_KINDS: [&str; 5] = [
    "Status",
    "APIVersions",
    "APIGroupList",
    "APIGroup",
    "APIResourceList",
];

const OPTION_KINDS: [&str; 6] = [
    "ListOptions",
    "GetOptions",
    "DeleteOptions",
    "CreateOptions",
    "UpdateOptions",
    "WatchEvent",
];

/// Known kinds, grouped by group version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    kinds: BTreeMap<GroupVersion, BTreeSet<String>>,
    unversioned: BTreeSet<String>,
}

impl Default for Scheme {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheme {
    /// A scheme holding only the meta kinds.
    pub fn new() -> Self {
        let mut scheme = Self {
            kinds: BTreeMap::new(),
            unversioned: BTreeSet::new(),
        };
        let v1 = GroupVersion::new("", "v1");
        scheme.add_unversioned_types(&v1, &UNVERSIONED_KINDS);
        scheme.add_known_types(&v1, &OPTION_KINDS);
        scheme
    }

    /// A fresh scheme with every installer applied in order.
    pub fn from_installers(installers: &[SchemeInstaller]) -> Self {
        let mut scheme = Self::new();
        for install in installers {
            install(&mut scheme);
        }
        scheme
    }

    pub fn add_known_type(&mut self, gv: &GroupVersion, kind: &str) {
        self.kinds
            .entry(gv.clone())
            .or_default()
            .insert(kind.to_string());
    }

    pub fn add_known_types(&mut self, gv: &GroupVersion, kinds: &[&str]) {
        for kind in kinds {
            self.add_known_type(gv, kind);
        }
    }

    /// Kinds that are the same in every group version.
    pub fn add_unversioned_types(&mut self, gv: &GroupVersion, kinds: &[&str]) {
        for kind in kinds {
            self.add_known_type(gv, kind);
            self.unversioned.insert(kind.to_string());
        }
    }

    pub fn recognizes(&self, gvk: &GroupVersionKind) -> bool {
        self.unversioned.contains(&gvk.kind)
            || self
                .kinds
                .get(&gvk.group_version())
                .map(|kinds| kinds.contains(&gvk.kind))
                .unwrap_or(false)
    }

    pub fn is_unversioned(&self, kind: &str) -> bool {
        self.unversioned.contains(kind)
    }

    pub fn is_version_registered(&self, gv: &GroupVersion) -> bool {
        self.kinds.contains_key(gv)
    }

    pub fn is_group_registered(&self, group: &str) -> bool {
        self.kinds.keys().any(|gv| gv.group == group)
    }

    /// Kinds known in one group version, sorted.
    pub fn known_kinds(&self, gv: &GroupVersion) -> Vec<String> {
        self.kinds
            .get(gv)
            .map(|kinds| kinds.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn group_versions(&self) -> Vec<GroupVersion> {
        self.kinds.keys().cloned().collect()
    }
}

/// Encodes and decodes objects as JSON, checking kinds against a scheme.
#[derive(Debug, Clone)]
pub struct CodecFactory {
    scheme: Arc<Scheme>,
}

impl CodecFactory {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Stamp `apiVersion` and `kind` onto an outgoing object.
    pub fn encode(&self, gvk: &GroupVersionKind, mut value: Value) -> Result<Value, StatusError> {
        if !self.scheme.recognizes(gvk) {
            return Err(StatusError::Internal(format!(
                "no kind {:?} is registered for version {:?}",
                gvk.kind,
                gvk.group_version().api_version()
            )));
        }
        stamp(&mut value, &gvk.group_version(), &gvk.kind);
        Ok(value)
    }

    /// Stamp the list kind of `item` onto an outgoing list.
    pub fn encode_list(&self, item: &GroupVersionKind, mut value: Value) -> Result<Value, StatusError> {
        if !self.scheme.recognizes(item) {
            return Err(StatusError::Internal(format!(
                "no kind {:?} is registered for version {:?}",
                item.kind,
                item.group_version().api_version()
            )));
        }
        stamp(&mut value, &item.group_version(), &list_kind(&item.kind));
        Ok(value)
    }

    /// Parse a request body that must be an object of kind `expected`.
    ///
    /// Missing `apiVersion` / `kind` are filled in; mismatching ones are rejected.
    pub fn decode(&self, expected: &GroupVersionKind, body: &[u8]) -> Result<Value, StatusError> {
        let mut value: Value = serde_json::from_slice(body)
            .map_err(|e| StatusError::BadRequest(format!("invalid JSON body: {}", e)))?;
        if !value.is_object() {
            return Err(StatusError::BadRequest(
                "request body must be a JSON object".to_string(),
            ));
        }

        let expected_version = expected.group_version().api_version();
        if let Some(api_version) = value.get("apiVersion").and_then(Value::as_str) {
            if api_version != expected_version {
                return Err(StatusError::BadRequest(format!(
                    "apiVersion {:?} does not match the expected {:?}",
                    api_version, expected_version
                )));
            }
        }
        if let Some(kind) = value.get("kind").and_then(Value::as_str) {
            if kind != expected.kind {
                return Err(StatusError::BadRequest(format!(
                    "kind {:?} does not match the expected {:?}",
                    kind, expected.kind
                )));
            }
        }

        stamp(&mut value, &expected.group_version(), &expected.kind);
        Ok(value)
    }
}

fn stamp(value: &mut Value, gv: &GroupVersion, kind: &str) {
    if let Value::Object(map) = value {
        map.insert("apiVersion".to_string(), Value::String(gv.api_version()));
        map.insert("kind".to_string(), Value::String(kind.to_string()));
    }
}

/// Decodes request options from query parameters.
#[derive(Debug, Clone)]
pub struct ParameterCodec {
    scheme: Arc<Scheme>,
}

impl ParameterCodec {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self { scheme }
    }

    /// Decode the query string of `uri` into the option kind `kind`.
    pub fn decode<P: DeserializeOwned>(&self, kind: &str, uri: &Uri) -> Result<P, StatusError> {
        let gvk = GroupVersionKind::new("", "v1", kind);
        if !self.scheme.recognizes(&gvk) {
            return Err(StatusError::Internal(format!(
                "option kind {:?} is not registered",
                kind
            )));
        }
        Query::<P>::try_from_uri(uri)
            .map(|Query(options)| options)
            .map_err(|e| StatusError::BadRequest(format!("invalid query parameters: {}", e)))
    }
}
