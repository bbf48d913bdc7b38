//! Option objects - validated values that apply themselves to a [`Config`].
//!
//! Options replace process-wide flag state: a server is configured by the
//! [`BaseServerOptions`] value it is given, which may be built in code or
//! loaded from JSON.
//!
//! ## Example
//!
//! ```ignore
//! let mut options = BaseServerOptions::from_json(r#"{
//!     "secureServing": { "bindPort": 8443 },
//!     "storage": { "prefix": "/demo" }
//! }"#)?;
//! options.authorization.always_allow_groups.push("demo:admins".into());
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use super::auth::{
    AlwaysAllowAuthorizer, Authenticator, Authorizer, GroupAuthorizer, PathAuthorizer,
    RequestHeaderAuthenticator, UnionAuthenticator, UnionAuthorizer,
};
use super::config::{CertSource, Config, FeatureConfig, ServingInfo};
use crate::error::ConfigError;
use crate::storage::{InMemoryBackend, InMemoryRestOptionsGetter, RestOptionsGetter};

/// A configuration step.
///
/// `apply_to` must not mutate the option object; it returns the updated config.
pub trait ServerOption: Send + Sync {
    fn name(&self) -> &str;

    /// Problems with the option values. Empty means valid.
    fn validate(&self) -> Vec<String> {
        Vec::new()
    }

    fn apply_to(&self, config: Config) -> Result<Config, ConfigError>;
}

/// Listener and serving certificate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecureServingOptions {
    pub bind_address: IpAddr,
    /// `0` picks a free port.
    pub bind_port: u16,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub http2_max_streams_per_connection: u32,
    #[serde(skip)]
    self_signed: Option<(Vec<String>, Vec<IpAddr>)>,
}

impl Default for SecureServingOptions {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: 443,
            cert_file: None,
            key_file: None,
            http2_max_streams_per_connection: 1000,
            self_signed: None,
        }
    }
}

impl SecureServingOptions {
    /// When no certificate is configured, use a self-signed one for the given names.
    pub fn maybe_default_with_self_signed_certs(
        &self,
        public_address: &str,
        alternate_dns: &[&str],
        alternate_ips: &[IpAddr],
    ) -> Result<Self, ConfigError> {
        let mut options = self.clone();
        if options.cert_file.is_some() {
            return Ok(options);
        }
        if public_address.is_empty() {
            return Err(ConfigError::Apply {
                option: self.name().to_string(),
                message: "a public address is required for self-signed certificates".to_string(),
            });
        }
        let mut hosts = vec![public_address.to_string()];
        hosts.extend(alternate_dns.iter().map(|h| h.to_string()));
        options.self_signed = Some((hosts, alternate_ips.to_vec()));
        Ok(options)
    }
}

impl ServerOption for SecureServingOptions {
    fn name(&self) -> &str {
        "secure-serving"
    }

    fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if self.cert_file.is_some() != self.key_file.is_some() {
            errs.push("cert_file and key_file must be set together".to_string());
        }
        if self.http2_max_streams_per_connection == 0 {
            errs.push("http2_max_streams_per_connection must be greater than 0".to_string());
        }
        errs
    }

    fn apply_to(&self, mut config: Config) -> Result<Config, ConfigError> {
        let cert = match (&self.cert_file, &self.key_file, &self.self_signed) {
            (Some(cert_file), Some(key_file), _) => {
                for file in [cert_file, key_file] {
                    if !file.exists() {
                        return Err(ConfigError::Apply {
                            option: self.name().to_string(),
                            message: format!("{} does not exist", file.display()),
                        });
                    }
                }
                CertSource::Files {
                    cert_file: cert_file.clone(),
                    key_file: key_file.clone(),
                }
            }
            (_, _, Some((hosts, ips))) => CertSource::SelfSigned {
                hosts: hosts.clone(),
                ips: ips.clone(),
            },
            _ => CertSource::None,
        };
        config.serving = ServingInfo {
            bind_address: SocketAddr::new(self.bind_address, self.bind_port),
            http2_max_streams_per_connection: self.http2_max_streams_per_connection,
            cert,
        };
        Ok(config)
    }
}

/// Headers a trusted front proxy uses to pass the caller's identity.
///
/// Empty by default. Only set these when every request reaches the server
/// through a proxy that strips client-supplied copies of the headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestHeaderOptions {
    pub username_headers: Vec<String>,
    pub group_headers: Vec<String>,
    pub extra_header_prefixes: Vec<String>,
}

impl RequestHeaderOptions {
    /// The conventional `X-Remote-*` header names.
    pub fn remote_headers() -> Self {
        Self {
            username_headers: vec!["X-Remote-User".to_string()],
            group_headers: vec!["X-Remote-Group".to_string()],
            extra_header_prefixes: vec!["X-Remote-Extra-".to_string()],
        }
    }
}

/// Authentication, optionally delegated to a remote authority.
///
/// The remote protocol is not built in: a delegate [`Authenticator`] stands in for it.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelegatingAuthenticationOptions {
    pub remote_kubeconfig_file: Option<PathBuf>,
    pub anonymous: bool,
    pub request_header: RequestHeaderOptions,
    #[serde(skip)]
    pub delegate: Option<Arc<dyn Authenticator>>,
}

impl Default for DelegatingAuthenticationOptions {
    fn default() -> Self {
        Self {
            remote_kubeconfig_file: None,
            anonymous: true,
            request_header: RequestHeaderOptions::default(),
            delegate: None,
        }
    }
}

impl DelegatingAuthenticationOptions {
    pub fn with_delegate(mut self, delegate: Arc<dyn Authenticator>) -> Self {
        self.delegate = Some(delegate);
        self
    }
}

impl ServerOption for DelegatingAuthenticationOptions {
    fn name(&self) -> &str {
        "authentication"
    }

    fn apply_to(&self, mut config: Config) -> Result<Config, ConfigError> {
        let mut authenticators: Vec<Arc<dyn Authenticator>> = Vec::new();
        if !self.request_header.username_headers.is_empty() {
            authenticators.push(Arc::new(RequestHeaderAuthenticator::new(
                self.request_header.username_headers.clone(),
                self.request_header.group_headers.clone(),
                self.request_header.extra_header_prefixes.clone(),
            )));
        }
        match (&self.delegate, &self.remote_kubeconfig_file) {
            (Some(delegate), _) => authenticators.push(Arc::clone(delegate)),
            (None, Some(path)) => {
                return Err(ConfigError::Apply {
                    option: self.name().to_string(),
                    message: format!(
                        "remote authentication via {} requires a delegate authenticator",
                        path.display()
                    ),
                })
            }
            (None, None) => {}
        }
        config.authenticator = Some(Arc::new(UnionAuthenticator::new(
            authenticators,
            self.anonymous,
        )));
        Ok(config)
    }
}

/// Authorization, optionally delegated to a remote authority.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DelegatingAuthorizationOptions {
    pub remote_kubeconfig_file: Option<PathBuf>,
    /// Non-resource paths anyone may request. A trailing `*` matches a prefix.
    pub always_allow_paths: Vec<String>,
    /// Groups whose members may do anything.
    pub always_allow_groups: Vec<String>,
    #[serde(skip)]
    pub delegate: Option<Arc<dyn Authorizer>>,
}

impl Default for DelegatingAuthorizationOptions {
    fn default() -> Self {
        Self {
            remote_kubeconfig_file: None,
            always_allow_paths: vec![
                "/healthz".to_string(),
                "/livez".to_string(),
                "/readyz".to_string(),
            ],
            always_allow_groups: vec!["system:masters".to_string()],
            delegate: None,
        }
    }
}

impl DelegatingAuthorizationOptions {
    pub fn with_delegate(mut self, delegate: Arc<dyn Authorizer>) -> Self {
        self.delegate = Some(delegate);
        self
    }
}

impl ServerOption for DelegatingAuthorizationOptions {
    fn name(&self) -> &str {
        "authorization"
    }

    fn validate(&self) -> Vec<String> {
        self.always_allow_paths
            .iter()
            .filter(|p| !p.starts_with('/'))
            .map(|p| format!("always-allow path {:?} must start with '/'", p))
            .collect()
    }

    fn apply_to(&self, mut config: Config) -> Result<Config, ConfigError> {
        let mut authorizers: Vec<Arc<dyn Authorizer>> = vec![
            Arc::new(PathAuthorizer::new(self.always_allow_paths.clone())),
            Arc::new(GroupAuthorizer::new(self.always_allow_groups.clone())),
        ];
        match (&self.delegate, &self.remote_kubeconfig_file) {
            (Some(delegate), _) => authorizers.push(Arc::clone(delegate)),
            (None, Some(path)) => {
                return Err(ConfigError::Apply {
                    option: self.name().to_string(),
                    message: format!(
                        "remote authorization via {} requires a delegate authorizer",
                        path.display()
                    ),
                })
            }
            (None, None) => {
                tracing::warn!("no remote authorizer configured; every authenticated request is allowed");
                authorizers.push(Arc::new(AlwaysAllowAuthorizer));
            }
        }
        config.authorizer = Some(Arc::new(UnionAuthorizer::new(authorizers)));
        Ok(config)
    }
}

/// Profiling switches and feature gates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureOptions {
    pub enable_profiling: bool,
    pub enable_contention_profiling: bool,
    pub feature_gates: BTreeMap<String, bool>,
}

impl Default for FeatureOptions {
    fn default() -> Self {
        Self {
            enable_profiling: true,
            enable_contention_profiling: false,
            feature_gates: BTreeMap::new(),
        }
    }
}

impl ServerOption for FeatureOptions {
    fn name(&self) -> &str {
        "features"
    }

    fn validate(&self) -> Vec<String> {
        if self.enable_contention_profiling && !self.enable_profiling {
            vec!["contention profiling requires profiling to be enabled".to_string()]
        } else {
            Vec::new()
        }
    }

    fn apply_to(&self, mut config: Config) -> Result<Config, ConfigError> {
        config.features = FeatureConfig {
            enable_profiling: self.enable_profiling,
            enable_contention_profiling: self.enable_contention_profiling,
            gates: self.feature_gates.clone(),
        };
        Ok(config)
    }
}

/// The persistence backend handed to generic stores.
///
/// Without an explicit getter, stores share one in-memory backend.
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageBackendOptions {
    /// Key prefix under which every resource is stored.
    pub prefix: String,
    /// Number of changes the in-memory backend keeps for watch replay.
    pub watch_history: usize,
    #[serde(skip)]
    pub getter: Option<Arc<dyn RestOptionsGetter>>,
}

impl Default for StorageBackendOptions {
    fn default() -> Self {
        Self {
            prefix: "/registry".to_string(),
            watch_history: 1024,
            getter: None,
        }
    }
}

impl StorageBackendOptions {
    pub fn with_getter(mut self, getter: Arc<dyn RestOptionsGetter>) -> Self {
        self.getter = Some(getter);
        self
    }
}

impl ServerOption for StorageBackendOptions {
    fn name(&self) -> &str {
        "storage"
    }

    fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if !self.prefix.starts_with('/') {
            errs.push(format!("storage prefix {:?} must start with '/'", self.prefix));
        }
        if self.watch_history == 0 {
            errs.push("watch_history must be greater than 0".to_string());
        }
        errs
    }

    fn apply_to(&self, mut config: Config) -> Result<Config, ConfigError> {
        let getter: Arc<dyn RestOptionsGetter> = match &self.getter {
            Some(getter) => Arc::clone(getter),
            None => Arc::new(InMemoryRestOptionsGetter::with_backend(
                InMemoryBackend::with_history(self.watch_history),
                self.prefix.clone(),
            )),
        };
        config.rest_options_getter = Some(getter);
        Ok(config)
    }
}

/// Every option object a server is configured with.
#[derive(Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BaseServerOptions {
    pub secure_serving: SecureServingOptions,
    pub authentication: DelegatingAuthenticationOptions,
    pub authorization: DelegatingAuthorizationOptions,
    pub features: FeatureOptions,
    pub storage: StorageBackendOptions,
    /// Applied after the built-in options, in order.
    #[serde(skip)]
    pub extra: Vec<Arc<dyn ServerOption>>,
}

impl BaseServerOptions {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidOptions(vec![e.to_string()]))
    }

    pub fn with_extra(mut self, option: Arc<dyn ServerOption>) -> Self {
        self.extra.push(option);
        self
    }

    /// Validate every option object, collecting all problems.
    pub fn validate(&self) -> Vec<String> {
        let mut all: Vec<&dyn ServerOption> = vec![
            &self.secure_serving,
            &self.authentication,
            &self.authorization,
            &self.features,
            &self.storage,
        ];
        for option in &self.extra {
            all.push(option.as_ref());
        }
        all.into_iter()
            .flat_map(|option| {
                let name = option.name().to_string();
                option
                    .validate()
                    .into_iter()
                    .map(move |problem| format!("{}: {}", name, problem))
            })
            .collect()
    }
}
