//! Server configuration, completion, and group/version folding.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::auth::{AlwaysAllowAuthorizer, Authenticator, Authorizer, UnionAuthenticator};
use super::generic::GenericApiServer;
use crate::builder::StorageFactory;
use crate::error::ConfigError;
use crate::meta::{GroupVersion, GroupVersionResource};
use crate::rest::Storage;
use crate::scheme::{CodecFactory, ParameterCodec, Scheme};
use crate::storage::{BackendError, RestOptionsGetter};

/// A resource identifier bound to the storage that serves it.
#[derive(Clone)]
pub struct StorageInfo {
    pub gvr: GroupVersionResource,
    pub storage: Arc<dyn Storage>,
}

/// Everything served under one API group: version -> resource -> storage.
#[derive(Clone)]
pub struct ApiGroupInfo {
    pub name: String,
    pub versioned_resources: BTreeMap<String, BTreeMap<String, Arc<dyn Storage>>>,
}

impl ApiGroupInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versioned_resources: BTreeMap::new(),
        }
    }
}

/// Group bindings by API group, then version.
///
/// A resource bound twice within one group version is rejected.
pub fn fold_storage(bindings: &[StorageInfo]) -> Result<BTreeMap<String, ApiGroupInfo>, ConfigError> {
    let mut groups: BTreeMap<String, ApiGroupInfo> = BTreeMap::new();
    for binding in bindings {
        let gvr = &binding.gvr;
        let resources = groups
            .entry(gvr.group.clone())
            .or_insert_with(|| ApiGroupInfo::new(gvr.group.clone()))
            .versioned_resources
            .entry(gvr.version.clone())
            .or_default();
        if resources.contains_key(&gvr.resource) {
            return Err(ConfigError::DuplicateResource {
                group_version: gvr.group_version(),
                resource: gvr.resource.clone(),
            });
        }
        tracing::debug!(%gvr, "folded storage");
        resources.insert(gvr.resource.clone(), Arc::clone(&binding.storage));
    }
    Ok(groups)
}

/// Build information served at `/version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub major: String,
    pub minor: String,
    pub git_version: String,
    pub git_commit: String,
    pub git_tree_state: String,
    pub build_date: String,
    pub compiler: String,
    pub platform: String,
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self {
            major: "1".to_string(),
            minor: "0".to_string(),
            git_version: format!("v{}", env!("CARGO_PKG_VERSION")),
            git_commit: String::new(),
            git_tree_state: String::new(),
            build_date: String::new(),
            compiler: "rustc".to_string(),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// Where the serving certificate comes from. TLS itself is terminated in front of the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CertSource {
    #[default]
    None,
    Files { cert_file: PathBuf, key_file: PathBuf },
    SelfSigned { hosts: Vec<String>, ips: Vec<IpAddr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingInfo {
    pub bind_address: SocketAddr,
    pub http2_max_streams_per_connection: u32,
    pub cert: CertSource,
}

impl Default for ServingInfo {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 443),
            http2_max_streams_per_connection: 1000,
            cert: CertSource::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureConfig {
    pub enable_profiling: bool,
    pub enable_contention_profiling: bool,
    pub gates: BTreeMap<String, bool>,
}

impl FeatureConfig {
    pub fn enabled(&self, gate: &str) -> bool {
        self.gates.get(gate).copied().unwrap_or(false)
    }
}

#[derive(Clone)]
pub(crate) struct PendingStore {
    pub gvr: GroupVersionResource,
    pub factory: Arc<dyn StorageFactory>,
}

/// A server configuration, as option objects build it up.
pub struct Config {
    pub scheme: Arc<Scheme>,
    /// Scheme for request options. Defaults to `scheme`.
    pub parameter_scheme: Option<Arc<Scheme>>,
    pub storage: Vec<StorageInfo>,
    pub(crate) stores: Vec<PendingStore>,
    pub serving: ServingInfo,
    pub authenticator: Option<Arc<dyn Authenticator>>,
    pub authorizer: Option<Arc<dyn Authorizer>>,
    pub rest_options_getter: Option<Arc<dyn RestOptionsGetter>>,
    pub features: FeatureConfig,
    pub version: VersionInfo,
}

impl Config {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self {
            scheme,
            parameter_scheme: None,
            storage: Vec::new(),
            stores: Vec::new(),
            serving: ServingInfo::default(),
            authenticator: None,
            authorizer: None,
            rest_options_getter: None,
            features: FeatureConfig::default(),
            version: VersionInfo::default(),
        }
    }

    /// Fill in derived state: finalize deferred stores and build the codecs.
    pub fn complete(self) -> Result<CompletedConfig, ConfigError> {
        let mut storage = self.storage;
        if !self.stores.is_empty() {
            let getter = self.rest_options_getter.as_ref().ok_or_else(|| {
                ConfigError::Backend(BackendError::Unavailable(
                    "no storage backend is configured".to_string(),
                ))
            })?;
            for pending in self.stores {
                let store = pending
                    .factory
                    .new_storage(pending.gvr.group_resource(), &**getter)?;
                storage.push(StorageInfo {
                    gvr: pending.gvr,
                    storage: store,
                });
            }
        }

        let authenticator = self
            .authenticator
            .unwrap_or_else(|| Arc::new(UnionAuthenticator::anonymous_only()));
        let authorizer = self.authorizer.unwrap_or_else(|| {
            tracing::warn!("no authorizer configured; allowing every request");
            Arc::new(AlwaysAllowAuthorizer)
        });

        let parameter_scheme = self
            .parameter_scheme
            .unwrap_or_else(|| Arc::clone(&self.scheme));

        Ok(CompletedConfig {
            codecs: CodecFactory::new(Arc::clone(&self.scheme)),
            parameter_codec: ParameterCodec::new(parameter_scheme),
            scheme: self.scheme,
            storage,
            serving: self.serving,
            authenticator,
            authorizer,
            rest_options_getter: self.rest_options_getter,
            features: self.features,
            version: self.version,
        })
    }
}

/// A configuration with every derived field filled in.
pub struct CompletedConfig {
    pub(crate) scheme: Arc<Scheme>,
    pub(crate) codecs: CodecFactory,
    pub(crate) parameter_codec: ParameterCodec,
    pub(crate) storage: Vec<StorageInfo>,
    pub(crate) serving: ServingInfo,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) authorizer: Arc<dyn Authorizer>,
    pub(crate) rest_options_getter: Option<Arc<dyn RestOptionsGetter>>,
    pub(crate) features: FeatureConfig,
    pub(crate) version: VersionInfo,
}

impl CompletedConfig {
    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    pub fn codecs(&self) -> &CodecFactory {
        &self.codecs
    }

    pub fn storage(&self) -> &[StorageInfo] {
        &self.storage
    }

    pub fn serving(&self) -> &ServingInfo {
        &self.serving
    }

    pub fn features(&self) -> &FeatureConfig {
        &self.features
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn rest_options_getter(&self) -> Option<&Arc<dyn RestOptionsGetter>> {
        self.rest_options_getter.as_ref()
    }

    /// Fold every binding into groups and install them, sorted by group name, into a new server.
    pub fn new_server(&self, name: &str) -> Result<GenericApiServer, ConfigError> {
        let groups = fold_storage(&self.storage)?;
        let mut server = GenericApiServer::new(name, self);
        for (_, group) in groups {
            server.install_api_group(group)?;
        }
        Ok(server)
    }

    /// Every group version with at least one bound resource.
    pub fn group_versions(&self) -> Vec<GroupVersion> {
        let mut gvs: Vec<GroupVersion> = self.storage.iter().map(|s| s.gvr.group_version()).collect();
        gvs.sort();
        gvs.dedup();
        gvs
    }
}
