//! The API server: option objects, config completion, authentication,
//! discovery and HTTP serving.
//!
//! Most programs only need [`ApiServerBase`]; the other types are exposed
//! for servers that assemble the pieces themselves.

mod auth;
mod base;
mod config;
mod discovery;
mod generic;
mod options;

pub use auth::{
    check_decision, AlwaysAllowAuthorizer, Attributes, Authenticator, Authorizer, Decision,
    GroupAuthorizer, PathAuthorizer, RequestHeaderAuthenticator, UnionAuthenticator,
    UnionAuthorizer,
};
pub use base::{ApiServerBase, Stage};
pub use config::{
    fold_storage, ApiGroupInfo, CertSource, CompletedConfig, Config, FeatureConfig,
    ServingInfo, StorageInfo, VersionInfo,
};
pub use discovery::{
    compare_versions, ApiGroup, ApiGroupList, ApiResource, ApiResourceList,
    GroupVersionForDiscovery,
};
pub use generic::GenericApiServer;
pub use options::{
    BaseServerOptions, DelegatingAuthenticationOptions, DelegatingAuthorizationOptions,
    FeatureOptions, RequestHeaderOptions, SecureServingOptions, ServerOption,
    StorageBackendOptions,
};
