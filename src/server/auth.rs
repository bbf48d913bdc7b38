//! Authentication and authorization seams.
//!
//! The protocols behind delegated authentication and authorization are
//! bound through the [`Authenticator`] and [`Authorizer`] traits. The
//! in-process implementations here cover request-header identities,
//! anonymous access and always-allow paths and groups.

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::error::StatusError;
use crate::request::UserInfo;

/// Identifies the caller of a request.
pub trait Authenticator: Send + Sync {
    /// `Ok(None)` means this authenticator has no opinion.
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserInfo>, StatusError>;
}

/// Reads the identity from headers set by a trusted front proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeaderAuthenticator {
    username_headers: Vec<String>,
    group_headers: Vec<String>,
    extra_header_prefixes: Vec<String>,
}

impl RequestHeaderAuthenticator {
    pub fn new(
        username_headers: Vec<String>,
        group_headers: Vec<String>,
        extra_header_prefixes: Vec<String>,
    ) -> Self {
        Self {
            username_headers,
            group_headers,
            extra_header_prefixes: extra_header_prefixes
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
        }
    }
}

impl Authenticator for RequestHeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserInfo>, StatusError> {
        let username = self
            .username_headers
            .iter()
            .filter_map(|h| headers.get(h.as_str()))
            .filter_map(|v| v.to_str().ok())
            .map(str::trim)
            .find(|v| !v.is_empty());
        let username = match username {
            Some(username) => username,
            None => return Ok(None),
        };

        let groups: Vec<String> = self
            .group_headers
            .iter()
            .flat_map(|h| headers.get_all(h.as_str()).into_iter())
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();

        let mut user = UserInfo::new(username).with_groups(groups);
        for (name, value) in headers.iter() {
            let name = name.as_str();
            for prefix in &self.extra_header_prefixes {
                if let Some(key) = name.strip_prefix(prefix.as_str()) {
                    if let Ok(value) = value.to_str() {
                        user.extra
                            .entry(key.to_string())
                            .or_default()
                            .push(value.to_string());
                    }
                }
            }
        }
        Ok(Some(user))
    }
}

/// Tries each authenticator in turn, then falls back to anonymous if allowed.
#[derive(Clone)]
pub struct UnionAuthenticator {
    authenticators: Vec<Arc<dyn Authenticator>>,
    anonymous: bool,
}

impl UnionAuthenticator {
    pub fn new(authenticators: Vec<Arc<dyn Authenticator>>, anonymous: bool) -> Self {
        Self {
            authenticators,
            anonymous,
        }
    }

    pub fn anonymous_only() -> Self {
        Self::new(Vec::new(), true)
    }
}

impl Authenticator for UnionAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Option<UserInfo>, StatusError> {
        for authenticator in &self.authenticators {
            if let Some(user) = authenticator.authenticate(headers)? {
                return Ok(Some(user));
            }
        }
        if self.anonymous {
            return Ok(Some(UserInfo::anonymous()));
        }
        Err(StatusError::Unauthorized(
            "no credentials were presented".to_string(),
        ))
    }
}

/// What a request is trying to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pub user: UserInfo,
    pub verb: String,
    pub path: String,
    pub resource_request: bool,
    pub group: String,
    pub version: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
    NoOpinion,
}

pub trait Authorizer: Send + Sync {
    fn authorize(&self, attributes: &Attributes) -> Decision;
}

/// Allows non-resource requests to listed paths. A trailing `*` matches a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAuthorizer {
    paths: Vec<String>,
}

impl PathAuthorizer {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }
}

impl Authorizer for PathAuthorizer {
    fn authorize(&self, attributes: &Attributes) -> Decision {
        if attributes.resource_request {
            return Decision::NoOpinion;
        }
        let allowed = self.paths.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => attributes.path.starts_with(prefix),
            None => attributes.path == *p,
        });
        if allowed {
            Decision::Allow
        } else {
            Decision::NoOpinion
        }
    }
}

/// Allows every request from members of the listed groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAuthorizer {
    groups: Vec<String>,
}

impl GroupAuthorizer {
    pub fn new(groups: Vec<String>) -> Self {
        Self { groups }
    }
}

impl Authorizer for GroupAuthorizer {
    fn authorize(&self, attributes: &Attributes) -> Decision {
        if self.groups.iter().any(|g| attributes.user.in_group(g)) {
            Decision::Allow
        } else {
            Decision::NoOpinion
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAllowAuthorizer;

impl Authorizer for AlwaysAllowAuthorizer {
    fn authorize(&self, _attributes: &Attributes) -> Decision {
        Decision::Allow
    }
}

/// First authorizer with an opinion wins. No opinion at all is a denial.
#[derive(Clone)]
pub struct UnionAuthorizer {
    authorizers: Vec<Arc<dyn Authorizer>>,
}

impl UnionAuthorizer {
    pub fn new(authorizers: Vec<Arc<dyn Authorizer>>) -> Self {
        Self { authorizers }
    }
}

impl Authorizer for UnionAuthorizer {
    fn authorize(&self, attributes: &Attributes) -> Decision {
        for authorizer in &self.authorizers {
            match authorizer.authorize(attributes) {
                Decision::NoOpinion => continue,
                decision => return decision,
            }
        }
        Decision::NoOpinion
    }
}

/// Turn a decision into a request error.
pub fn check_decision(decision: Decision, attributes: &Attributes) -> Result<(), StatusError> {
    let target = if attributes.resource_request {
        let mut target = format!("resource {:?}", attributes.resource);
        if !attributes.group.is_empty() {
            target.push_str(&format!(" in API group {:?}", attributes.group));
        }
        if !attributes.namespace.is_empty() {
            target.push_str(&format!(" in the namespace {:?}", attributes.namespace));
        }
        target
    } else {
        format!("path {:?}", attributes.path)
    };
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(StatusError::Forbidden(format!(
            "user {:?} cannot {} {}: {}",
            attributes.user.username, attributes.verb, target, reason
        ))),
        Decision::NoOpinion => Err(StatusError::Forbidden(format!(
            "user {:?} cannot {} {}",
            attributes.user.username, attributes.verb, target
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(*v));
        }
        map
    }

    fn request_header() -> RequestHeaderAuthenticator {
        RequestHeaderAuthenticator::new(
            vec!["X-Remote-User".into()],
            vec!["X-Remote-Group".into()],
            vec!["X-Remote-Extra-".into()],
        )
    }

    #[test]
    fn request_header_identity() {
        let user = request_header()
            .authenticate(&headers(&[
                ("x-remote-user", "alice"),
                ("x-remote-group", "devs"),
                ("x-remote-group", "ops,admins"),
                ("x-remote-extra-scope", "read"),
            ]))
            .unwrap()
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.groups, vec!["devs", "ops", "admins"]);
        assert_eq!(user.extra["scope"], vec!["read"]);
    }

    #[test]
    fn union_falls_back_to_anonymous() {
        let union = UnionAuthenticator::new(vec![Arc::new(request_header())], true);
        let user = union.authenticate(&HeaderMap::new()).unwrap().unwrap();
        assert_eq!(user.username, "system:anonymous");

        let strict = UnionAuthenticator::new(vec![Arc::new(request_header())], false);
        assert!(matches!(
            strict.authenticate(&HeaderMap::new()),
            Err(StatusError::Unauthorized(_))
        ));
    }

    #[test]
    fn always_allow_paths_and_groups() {
        let union = UnionAuthorizer::new(vec![
            Arc::new(PathAuthorizer::new(vec!["/healthz".into(), "/debug/*".into()])),
            Arc::new(GroupAuthorizer::new(vec!["system:masters".into()])),
        ]);

        let mut attrs = Attributes {
            path: "/healthz".into(),
            verb: "get".into(),
            ..Attributes::default()
        };
        assert_eq!(union.authorize(&attrs), Decision::Allow);
        attrs.path = "/debug/pprof".into();
        assert_eq!(union.authorize(&attrs), Decision::Allow);

        attrs.path = "/apis".into();
        assert_eq!(union.authorize(&attrs), Decision::NoOpinion);
        assert!(check_decision(union.authorize(&attrs), &attrs).is_err());

        attrs.user = UserInfo::new("root").with_groups(["system:masters"]);
        assert_eq!(union.authorize(&attrs), Decision::Allow);
    }
}
