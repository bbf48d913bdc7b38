//! Discovery documents served under `/apis`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionForDiscovery {
    pub group_version: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGroup {
    pub kind: String,
    pub api_version: String,
    pub name: String,
    pub versions: Vec<GroupVersionForDiscovery>,
    pub preferred_version: GroupVersionForDiscovery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGroupList {
    pub kind: String,
    pub api_version: String,
    pub groups: Vec<ApiGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    pub name: String,
    pub singular_name: String,
    pub namespaced: bool,
    pub kind: String,
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResourceList {
    pub kind: String,
    pub api_version: String,
    pub group_version: String,
    pub resources: Vec<ApiResource>,
}

impl ApiGroup {
    /// Describe a group. `versions` must be non-empty; the highest-priority version is preferred.
    pub fn new(name: &str, versions: &[String]) -> Self {
        let mut versions: Vec<GroupVersionForDiscovery> = versions
            .iter()
            .map(|version| GroupVersionForDiscovery {
                group_version: format!("{}/{}", name, version),
                version: version.clone(),
            })
            .collect();
        versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
        let preferred_version = versions.first().cloned().unwrap_or(GroupVersionForDiscovery {
            group_version: name.to_string(),
            version: String::new(),
        });
        Self {
            kind: "APIGroup".to_string(),
            api_version: "v1".to_string(),
            name: name.to_string(),
            versions,
            preferred_version,
        }
    }
}

impl ApiGroupList {
    pub fn new(groups: Vec<ApiGroup>) -> Self {
        Self {
            kind: "APIGroupList".to_string(),
            api_version: "v1".to_string(),
            groups,
        }
    }
}

impl ApiResourceList {
    pub fn new(group_version: String, resources: Vec<ApiResource>) -> Self {
        Self {
            kind: "APIResourceList".to_string(),
            api_version: "v1".to_string(),
            group_version,
            resources,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Stability {
    Alpha,
    Beta,
    Ga,
}

// `v2` -> (Ga, 2, 0); `v1beta3` -> (Beta, 1, 3).
fn parse_version(version: &str) -> Option<(Stability, u32, u32)> {
    let rest = version.strip_prefix('v')?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let major: u32 = rest[..digits].parse().ok()?;
    let tail = &rest[digits..];
    if tail.is_empty() {
        return Some((Stability::Ga, major, 0));
    }
    let (stability, minor) = if let Some(minor) = tail.strip_prefix("beta") {
        (Stability::Beta, minor)
    } else if let Some(minor) = tail.strip_prefix("alpha") {
        (Stability::Alpha, minor)
    } else {
        return None;
    };
    Some((stability, major, minor.parse().ok()?))
}

/// Order versions by priority, highest first: GA before beta before alpha,
/// newer before older. Unrecognized versions sort last, alphabetically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
