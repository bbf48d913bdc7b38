//! Label / field selectors and pagination, evaluated by the backend.

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BackendError;

/// One term of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelRequirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    NotExists(String),
}

impl LabelRequirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            LabelRequirement::Equals(k, v) => labels.get(k) == Some(v),
            LabelRequirement::NotEquals(k, v) => labels.get(k) != Some(v),
            LabelRequirement::In(k, vs) => labels.get(k).map(|l| vs.contains(l)).unwrap_or(false),
            LabelRequirement::NotIn(k, vs) => labels.get(k).map(|l| !vs.contains(l)).unwrap_or(true),
            LabelRequirement::Exists(k) => labels.contains_key(k),
            LabelRequirement::NotExists(k) => !labels.contains_key(k),
        }
    }
}

/// A conjunction of label requirements. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<LabelRequirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parse `a=b,c!=d,e,!f,g in (x,y),h notin (z)`.
    pub fn parse(selector: &str) -> Result<Self, String> {
        let mut requirements = Vec::new();
        for term in split_top_level(selector) {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            requirements.push(parse_label_term(term)?);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

// Split on commas that are not inside parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_label_term(term: &str) -> Result<LabelRequirement, String> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(LabelRequirement::NotExists(non_empty_key(key, term)?));
    }
    if let Some((key, values)) = term.split_once(" notin ") {
        return Ok(LabelRequirement::NotIn(
            non_empty_key(key, term)?,
            parse_set(values, term)?,
        ));
    }
    if let Some((key, values)) = term.split_once(" in ") {
        return Ok(LabelRequirement::In(
            non_empty_key(key, term)?,
            parse_set(values, term)?,
        ));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(LabelRequirement::NotEquals(
            non_empty_key(key, term)?,
            value.trim().to_string(),
        ));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(LabelRequirement::Equals(
            non_empty_key(key, term)?,
            value.trim().to_string(),
        ));
    }
    Ok(LabelRequirement::Exists(non_empty_key(term, term)?))
}

fn non_empty_key(key: &str, term: &str) -> Result<String, String> {
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(format!("invalid label selector term {:?}: bad key", term));
    }
    Ok(key.to_string())
}

fn parse_set(values: &str, term: &str) -> Result<Vec<String>, String> {
    let values = values.trim();
    let inner = values
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .ok_or_else(|| format!("invalid label selector term {:?}: expected (values)", term))?;
    Ok(inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect())
}

/// One term of a field selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRequirement {
    Equals(String, String),
    NotEquals(String, String),
}

/// A conjunction of field requirements on dotted JSON paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    /// Parse `metadata.name=foo,metadata.namespace!=bar`.
    pub fn parse(selector: &str) -> Result<Self, String> {
        let mut requirements = Vec::new();
        for term in selector.split(',') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let requirement = if let Some((k, v)) = term.split_once("!=") {
                FieldRequirement::NotEquals(k.trim().to_string(), v.trim().to_string())
            } else if let Some((k, v)) = term.split_once("==").or_else(|| term.split_once('=')) {
                FieldRequirement::Equals(k.trim().to_string(), v.trim().to_string())
            } else {
                return Err(format!("invalid field selector term {:?}", term));
            };
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, object: &Value) -> bool {
        self.requirements.iter().all(|r| match r {
            FieldRequirement::Equals(path, want) => field_value(object, path) == *want,
            FieldRequirement::NotEquals(path, want) => field_value(object, path) != *want,
        })
    }
}

// Missing fields compare as the empty string.
fn field_value(object: &Value, path: &str) -> String {
    let mut current = object;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return String::new(),
        }
    }
    match current {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Extract `metadata.labels` from a stored object.
pub fn labels_of(object: &Value) -> BTreeMap<String, String> {
    object
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.as_object())
        .map(|l| {
            l.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Everything a backend needs to filter and page a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionPredicate {
    pub label: LabelSelector,
    pub field: FieldSelector,
    /// Page size. `None` means unlimited.
    pub limit: Option<usize>,
    pub continue_token: Option<String>,
}

impl SelectionPredicate {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn matches(&self, object: &Value) -> bool {
        (self.label.is_empty() || self.label.matches(&labels_of(object)))
            && (self.field.is_empty() || self.field.matches(object))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ContinueToken {
    rv: u64,
    start: String,
}

/// Encode an opaque continue token: the list version and the last key returned.
pub fn encode_continue(version: u64, last_key: &str) -> String {
    let token = ContinueToken {
        rv: version,
        start: last_key.to_string(),
    };
    // Serializing a struct of a u64 and a String cannot fail.
    let bytes = serde_json::to_vec(&token).unwrap_or_default();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a continue token into `(version, last_key)`.
pub fn decode_continue(token: &str) -> Result<(u64, String), BackendError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| BackendError::InvalidContinue(e.to_string()))?;
    let token: ContinueToken =
        serde_json::from_slice(&bytes).map_err(|e| BackendError::InvalidContinue(e.to_string()))?;
    Ok((token.rv, token.start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn equality_and_inequality() {
        let sel = LabelSelector::parse("app=web,tier!=db").unwrap();
        assert!(sel.matches(&labels(&[("app", "web"), ("tier", "front")])));
        assert!(sel.matches(&labels(&[("app", "web")])));
        assert!(!sel.matches(&labels(&[("app", "web"), ("tier", "db")])));
        assert!(!sel.matches(&labels(&[("app", "api")])));
    }

    #[test]
    fn existence_terms() {
        let sel = LabelSelector::parse("app,!legacy").unwrap();
        assert!(sel.matches(&labels(&[("app", "x")])));
        assert!(!sel.matches(&labels(&[("app", "x"), ("legacy", "")])));
        assert!(!sel.matches(&labels(&[])));
    }

    #[test]
    fn set_terms() {
        let sel = LabelSelector::parse("env in (prod, staging),zone notin (a)").unwrap();
        assert!(sel.matches(&labels(&[("env", "prod")])));
        assert!(sel.matches(&labels(&[("env", "staging"), ("zone", "b")])));
        assert!(!sel.matches(&labels(&[("env", "dev")])));
        assert!(!sel.matches(&labels(&[("env", "prod"), ("zone", "a")])));
    }

    #[test]
    fn bad_selectors() {
        assert!(LabelSelector::parse("=x").is_err());
        assert!(LabelSelector::parse("env in prod").is_err());
        assert!(FieldSelector::parse("metadata.name").is_err());
    }

    #[test]
    fn field_selector_on_paths() {
        let obj = json!({ "metadata": { "name": "foo", "namespace": "bar" }, "spec": { "size": 3 } });
        assert!(FieldSelector::parse("metadata.name=foo").unwrap().matches(&obj));
        assert!(FieldSelector::parse("metadata.namespace!=baz").unwrap().matches(&obj));
        assert!(FieldSelector::parse("spec.size==3").unwrap().matches(&obj));
        assert!(!FieldSelector::parse("metadata.name=bar").unwrap().matches(&obj));
    }

    #[test]
    fn predicate_reads_labels_from_json() {
        let obj = json!({ "metadata": { "name": "foo", "labels": { "app": "web" } } });
        let pred = SelectionPredicate {
            label: LabelSelector::parse("app=web").unwrap(),
            ..SelectionPredicate::default()
        };
        assert!(pred.matches(&obj));
        assert!(SelectionPredicate::everything().matches(&json!({})));
    }

    #[test]
    fn continue_token_is_opaque_but_decodable() {
        let token = encode_continue(42, "/registry/demos/bar/foo");
        assert!(!token.contains('/'));
        let (rv, start) = decode_continue(&token).unwrap();
        assert_eq!(rv, 42);
        assert_eq!(start, "/registry/demos/bar/foo");
        assert!(decode_continue("not a token!").is_err());
    }
}
