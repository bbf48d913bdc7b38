//! Object metadata and the traits served types implement.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Metadata every stored object carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Prefix used to generate a unique name when `name` is empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    /// Opaque concurrency token. Clients echo it back on update.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Metadata carried by list responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    /// Token for fetching the next page. Empty on the last page.
    #[serde(default, rename = "continue", skip_serializing_if = "String::is_empty")]
    pub continue_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_item_count: Option<u64>,
}

/// Trait for types that can be served and stored as API objects.
///
/// Use `#[derive(Object)]` or implement by hand:
///
/// ```ignore
/// impl Object for Demo {
///     const KIND: &'static str = "Demo";
///     fn metadata(&self) -> &ObjectMeta { &self.metadata }
///     fn metadata_mut(&mut self) -> &mut ObjectMeta { &mut self.metadata }
/// }
/// ```
pub trait Object: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The kind name for this type (e.g. "Demo").
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

/// A collection of objects returned by list calls.
pub trait ObjectList: Serialize + Send + Sync + 'static {
    type Item: Object;

    fn list_meta_mut(&mut self) -> &mut ListMeta;

    fn set_items(&mut self, items: Vec<Self::Item>);

    fn items(&self) -> &[Self::Item];
}

/// The default list type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List<T> {
    #[serde(default)]
    pub metadata: ListMeta,
    pub items: Vec<T>,
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self {
            metadata: ListMeta::default(),
            items: Vec::new(),
        }
    }
}

impl<T: Object> ObjectList for List<T> {
    type Item = T;

    fn list_meta_mut(&mut self) -> &mut ListMeta {
        &mut self.metadata
    }

    fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
    }

    fn items(&self) -> &[T] {
        &self.items
    }
}

/// The kind name of the list for an object kind.
pub fn list_kind(kind: &str) -> String {
    format!("{}List", kind)
}
