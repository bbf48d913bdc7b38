//! The resource registry programs build their API server with.
//!
//! ```ignore
//! let mut base = ApiServerBase::new();
//! base.with_scheme(&[install_demo])?
//!     .with_store(
//!         GroupVersionResource::new("examples.k8s.io", "v1", "demos"),
//!         StorageBuilder::<Demo>::new()
//!             .with_new_func(Demo::default)
//!             .with_new_list_func(List::default)
//!             .build(),
//!     )?;
//! base.run().await?;
//! ```
//!
//! The registry moves through [`Stage`]s as its accessors are first called:
//! options are installed, then the config is completed, then the server is
//! built and run. Once the config is completed, resources and schemes can no
//! longer be registered.

use std::collections::BTreeSet;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use super::config::{CompletedConfig, Config, PendingStore, StorageInfo, VersionInfo};
use super::generic::GenericApiServer;
use super::options::{BaseServerOptions, ServerOption};
use crate::builder::StorageFactory;
use crate::error::{ConfigError, ServerError};
use crate::logging;
use crate::meta::GroupVersionResource;
use crate::rest::Storage;
use crate::scheme::{Scheme, SchemeInstaller};

const DEFAULT_NAME: &str = "aggregated-apiserver";

/// Lifecycle of an [`ApiServerBase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Uninitialized,
    OptionsInstalled,
    ConfigCompleted,
    ServerRunning,
}

/// Collects resources, schemes and options, then builds and runs a server.
pub struct ApiServerBase {
    name: String,
    stage: Stage,
    options: Option<BaseServerOptions>,
    scheme: Arc<Scheme>,
    parameter_scheme: Option<Arc<Scheme>>,
    storage: Vec<StorageInfo>,
    stores: Vec<PendingStore>,
    registered: BTreeSet<GroupVersionResource>,
    version: Option<VersionInfo>,
    config: Option<Arc<CompletedConfig>>,
    server: Option<Arc<GenericApiServer>>,
}

impl Default for ApiServerBase {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiServerBase {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            stage: Stage::Uninitialized,
            options: None,
            scheme: Arc::new(Scheme::new()),
            parameter_scheme: None,
            storage: Vec::new(),
            stores: Vec::new(),
            registered: BTreeSet::new(),
            version: None,
            config: None,
            server: None,
        }
    }

    /// Override the server name. Defaults to `aggregated-apiserver`.
    pub fn with_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Serve `storage` at `group/version/resource`.
    pub fn register_resource(
        &mut self,
        group: &str,
        version: &str,
        resource: &str,
        storage: Arc<dyn Storage>,
    ) -> Result<&mut Self, ConfigError> {
        self.with_storage(GroupVersionResource::new(group, version, resource), storage)
    }

    /// Serve `storage` at `gvr`. A second registration for the same
    /// identifier fails and the first is kept.
    pub fn with_storage(
        &mut self,
        gvr: GroupVersionResource,
        storage: Arc<dyn Storage>,
    ) -> Result<&mut Self, ConfigError> {
        self.claim(&gvr)?;
        tracing::debug!(%gvr, kind = storage.kind(), "registered storage");
        self.storage.push(StorageInfo { gvr, storage });
        Ok(self)
    }

    /// Serve a generic store at `gvr`. The store is finalized against the
    /// configured storage backend when the config is completed.
    pub fn with_store(
        &mut self,
        gvr: GroupVersionResource,
        factory: impl StorageFactory + 'static,
    ) -> Result<&mut Self, ConfigError> {
        self.claim(&gvr)?;
        tracing::debug!(%gvr, "registered store");
        self.stores.push(PendingStore {
            gvr,
            factory: Arc::new(factory),
        });
        Ok(self)
    }

    /// Replace the scheme with one built from `installers`.
    pub fn with_scheme(&mut self, installers: &[SchemeInstaller]) -> Result<&mut Self, ConfigError> {
        self.set_scheme(Scheme::from_installers(installers))
    }

    pub fn set_scheme(&mut self, scheme: Scheme) -> Result<&mut Self, ConfigError> {
        self.ensure_open("a scheme")?;
        self.scheme = Arc::new(scheme);
        Ok(self)
    }

    /// Use a separate scheme for decoding request options.
    pub fn with_parameter_scheme(&mut self, scheme: Scheme) -> Result<&mut Self, ConfigError> {
        self.ensure_open("a parameter scheme")?;
        self.parameter_scheme = Some(Arc::new(scheme));
        Ok(self)
    }

    pub fn with_version(&mut self, version: VersionInfo) -> Result<&mut Self, ConfigError> {
        self.ensure_open("version info")?;
        self.version = Some(version);
        Ok(self)
    }

    pub fn with_options(&mut self, options: BaseServerOptions) -> Result<&mut Self, ConfigError> {
        self.ensure_open("options")?;
        self.options = Some(options);
        if self.stage < Stage::OptionsInstalled {
            self.stage = Stage::OptionsInstalled;
        }
        Ok(self)
    }

    /// Install default options if none were supplied.
    pub fn install_options(&mut self) -> &mut BaseServerOptions {
        if self.stage < Stage::OptionsInstalled {
            self.stage = Stage::OptionsInstalled;
        }
        self.options.get_or_insert_with(BaseServerOptions::default)
    }

    pub fn options(&mut self) -> &BaseServerOptions {
        self.install_options()
    }

    /// Options for in-place tweaks before the config is completed.
    pub fn options_mut(&mut self) -> &mut BaseServerOptions {
        self.install_options()
    }

    /// Complete the configuration. Runs once; later calls return the same config.
    pub fn config(&mut self) -> Result<Arc<CompletedConfig>, ConfigError> {
        if let Some(config) = &self.config {
            return Ok(Arc::clone(config));
        }
        let options = self.install_options().clone();

        let problems = options.validate();
        if !problems.is_empty() {
            return Err(ConfigError::InvalidOptions(problems));
        }

        let mut config = Config::new(Arc::clone(&self.scheme));
        config.parameter_scheme = self.parameter_scheme.clone();
        config.storage = self.storage.clone();
        config.stores = self.stores.clone();
        if let Some(version) = &self.version {
            config.version = version.clone();
        }

        let serving = options.secure_serving.maybe_default_with_self_signed_certs(
            "localhost",
            &[],
            &[IpAddr::V4(Ipv4Addr::LOCALHOST)],
        )?;
        config = serving.apply_to(config)?;
        config = options.authentication.apply_to(config)?;
        config = options.authorization.apply_to(config)?;
        config = options.storage.apply_to(config)?;
        config = options.features.apply_to(config)?;
        for option in &options.extra {
            tracing::debug!(option = option.name(), "applying option");
            config = option.apply_to(config)?;
        }

        let completed = Arc::new(config.complete()?);
        self.config = Some(Arc::clone(&completed));
        self.stage = Stage::ConfigCompleted;
        tracing::debug!(server = %self.name, "configuration completed");
        Ok(completed)
    }

    /// Build the server from the completed config. Runs once.
    pub fn server(&mut self) -> Result<Arc<GenericApiServer>, ConfigError> {
        if let Some(server) = &self.server {
            return Ok(Arc::clone(server));
        }
        let config = self.config()?;
        let server = Arc::new(config.new_server(&self.name)?);
        self.server = Some(Arc::clone(&server));
        Ok(server)
    }

    /// Run until Ctrl-C.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "unable to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `stop` resolves.
    pub async fn run_until<F>(&mut self, stop: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        logging::init_logs();
        let server = self.server()?;
        self.stage = Stage::ServerRunning;
        server.run(stop).await
    }

    fn ensure_open(&self, what: &str) -> Result<(), ConfigError> {
        if self.stage >= Stage::ConfigCompleted {
            return Err(ConfigError::RegistrationClosed(what.to_string()));
        }
        Ok(())
    }

    fn claim(&mut self, gvr: &GroupVersionResource) -> Result<(), ConfigError> {
        self.ensure_open(&gvr.to_string())?;
        if !self.registered.insert(gvr.clone()) {
            return Err(ConfigError::DuplicateStorage(gvr.clone()));
        }
        Ok(())
    }
}
