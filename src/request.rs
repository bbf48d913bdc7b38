//! Request-scoped context passed into storage calls.
//!
//! Carries the request namespace, the authenticated user, and a
//! cancellation flag plus optional deadline. Storage checks the context
//! before each backend call so abandoned requests stop early.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::StatusError;

/// The authenticated identity of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl UserInfo {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn anonymous() -> Self {
        Self::new("system:anonymous").with_groups(["system:unauthenticated"])
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Shared flag set when a request is abandoned.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context for a single storage call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    namespace: Option<String>,
    user: Option<UserInfo>,
    deadline: Option<Instant>,
    cancel: CancelFlag,
}

impl RequestContext {
    /// A context with no namespace, user or deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context scoped to a namespace.
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self::new().namespace(namespace)
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = if namespace.is_empty() {
            None
        } else {
            Some(namespace)
        };
        self
    }

    pub fn user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// The request namespace, if the request was namespace-scoped.
    pub fn namespace_value(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn user_info(&self) -> Option<&UserInfo> {
        self.user.as_ref()
    }

    /// Cancel this request. Visible to every clone of the context.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns an error if the request was canceled or its deadline passed.
    pub fn check(&self) -> Result<(), StatusError> {
        if self.cancel.is_canceled() {
            return Err(StatusError::Canceled(
                "the request was canceled by the client".into(),
            ));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StatusError::Timeout(
                    "the request deadline was exceeded".into(),
                ));
            }
        }
        Ok(())
    }
}
