//! Generic API server - HTTP routing into installed storages.
//!
//! ## Routes
//!
//! - `GET /healthz`, `/livez`, `/readyz` - liveness, returns `ok`.
//! - `GET /version` - build information.
//! - `GET /apis`, `/apis/{group}`, `/apis/{group}/{version}` - discovery.
//! - `/apis/{group}/{version}/namespaces/{namespace}/{resource}[/{name}]` - namespaced objects.
//! - `/apis/{group}/{version}/{resource}[/{name}]` - cluster-scoped objects, or all namespaces.
//!
//! Collections answer `GET` (list, or a newline-delimited watch stream with
//! `?watch=true`) and `POST` (create). Items answer `GET`, `PUT` and
//! `DELETE`. Failures are JSON `Status` objects.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;

use super::auth::{check_decision, Attributes, Authenticator, Authorizer};
use super::config::{ApiGroupInfo, CompletedConfig, ServingInfo, VersionInfo};
use super::discovery::{ApiGroup, ApiGroupList, ApiResource, ApiResourceList};
use crate::error::{ConfigError, ServerError, StatusError};
use crate::meta::{
    DeleteOptions, GetOptions, GroupResource, GroupVersion, GroupVersionKind, GroupVersionResource,
    ListOptions,
};
use crate::request::{CancelFlag, RequestContext, UserInfo};
use crate::rest::{supported_verbs, Storage};
use crate::scheme::{CodecFactory, ParameterCodec, Scheme};
use crate::storage::WatchStream;

type VersionedResources = BTreeMap<String, BTreeMap<String, Arc<dyn Storage>>>;

/// The HTTP front of an API server.
pub struct GenericApiServer {
    name: String,
    groups: BTreeMap<String, VersionedResources>,
    scheme: Arc<Scheme>,
    codecs: CodecFactory,
    parameter_codec: ParameterCodec,
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
    serving: ServingInfo,
    version: VersionInfo,
}

impl GenericApiServer {
    pub(crate) fn new(name: &str, config: &CompletedConfig) -> Self {
        Self {
            name: name.to_string(),
            groups: BTreeMap::new(),
            scheme: Arc::clone(&config.scheme),
            codecs: config.codecs.clone(),
            parameter_codec: config.parameter_codec.clone(),
            authenticator: Arc::clone(&config.authenticator),
            authorizer: Arc::clone(&config.authorizer),
            serving: config.serving.clone(),
            version: config.version.clone(),
        }
    }

    /// Install every version of an API group.
    ///
    /// Fails when the group is already installed, has an empty version, or
    /// serves a kind the scheme does not know.
    pub fn install_api_group(&mut self, info: ApiGroupInfo) -> Result<(), ConfigError> {
        let install_error = |reason: String| ConfigError::Install {
            group: info.name.clone(),
            reason,
        };

        if info.name.is_empty() {
            return Err(install_error(
                "the legacy core group cannot be served under /apis".to_string(),
            ));
        }
        if self.groups.contains_key(&info.name) {
            return Err(install_error("group is already installed".to_string()));
        }
        if info.versioned_resources.is_empty() {
            return Err(install_error("no versions to install".to_string()));
        }
        for (version, resources) in &info.versioned_resources {
            if resources.is_empty() {
                return Err(install_error(format!("version {} has no resources", version)));
            }
            let gv = GroupVersion::new(info.name.clone(), version.clone());
            for (resource, storage) in resources {
                if !self.scheme.recognizes(&gv.with_kind(storage.kind())) {
                    return Err(install_error(format!(
                        "kind {:?} of resource {:?} is not registered for {}",
                        storage.kind(),
                        resource,
                        gv
                    )));
                }
            }
        }

        let versions: Vec<&String> = info.versioned_resources.keys().collect();
        tracing::info!(server = %self.name, group = %info.name, ?versions, "installed API group");
        self.groups.insert(info.name, info.versioned_resources);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn storage(&self, gvr: &GroupVersionResource) -> Option<Arc<dyn Storage>> {
        self.groups
            .get(&gvr.group)
            .and_then(|versions| versions.get(&gvr.version))
            .and_then(|resources| resources.get(&gvr.resource))
            .cloned()
    }

    pub fn serving(&self) -> &ServingInfo {
        &self.serving
    }

    /// Build an axum `Router` serving this server's routes.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/healthz", get(health_handler))
            .route("/livez", get(health_handler))
            .route("/readyz", get(health_handler))
            .route("/version", get(version_handler))
            .route("/apis", get(group_list_handler))
            .route("/apis/*path", any(api_handler))
            .with_state(Arc::clone(self))
    }

    /// Serve on the configured bind address until `stop` resolves.
    pub async fn run<F>(self: Arc<Self>, stop: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.serving.bind_address).await?;
        self.serve(listener, stop).await
    }

    /// Serve on an already bound listener until `stop` resolves.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, stop: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            server = %self.name,
            %addr,
            cert = ?self.serving.cert,
            max_streams = self.serving.http2_max_streams_per_connection,
            "serving"
        );
        let app = self.router();
        axum::serve(listener, app).with_graceful_shutdown(stop).await?;
        tracing::info!(server = %self.name, "server stopped");
        Ok(())
    }

    fn admit(&self, headers: &HeaderMap, mut attributes: Attributes) -> Result<UserInfo, StatusError> {
        let user = self.authenticator.authenticate(headers)?.ok_or_else(|| {
            StatusError::Unauthorized("no credentials were presented".to_string())
        })?;
        attributes.user = user;
        check_decision(self.authorizer.authorize(&attributes), &attributes)?;
        Ok(attributes.user)
    }

    fn admit_path(&self, headers: &HeaderMap, path: &str) -> Result<UserInfo, StatusError> {
        self.admit(
            headers,
            Attributes {
                verb: "get".to_string(),
                path: path.to_string(),
                ..Attributes::default()
            },
        )
    }

    fn group_discovery(&self, group: &str) -> Option<ApiGroup> {
        self.groups.get(group).map(|versions| {
            let names: Vec<String> = versions.keys().cloned().collect();
            ApiGroup::new(group, &names)
        })
    }

    fn resource_discovery(&self, group: &str, version: &str) -> Option<ApiResourceList> {
        let resources = self.groups.get(group)?.get(version)?;
        let resources = resources
            .iter()
            .map(|(name, storage)| ApiResource {
                name: name.clone(),
                singular_name: storage.kind().to_lowercase(),
                namespaced: storage.namespace_scoped(),
                kind: storage.kind().to_string(),
                verbs: supported_verbs(storage.as_ref())
                    .into_iter()
                    .map(String::from)
                    .collect(),
            })
            .collect();
        Some(ApiResourceList::new(
            GroupVersion::new(group, version).api_version(),
            resources,
        ))
    }

    async fn handle_api(
        &self,
        path: &str,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, StatusError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let not_found = || StatusError::NotFound {
            resource: GroupResource::default(),
            name: uri.path().to_string(),
        };

        let target = match segments.as_slice() {
            [group] => {
                self.admit_path(&headers, uri.path())?;
                let group = self.group_discovery(group).ok_or_else(not_found)?;
                return Ok(json_response(StatusCode::OK, &group));
            }
            [group, version] => {
                self.admit_path(&headers, uri.path())?;
                let list = self.resource_discovery(group, version).ok_or_else(not_found)?;
                return Ok(json_response(StatusCode::OK, &list));
            }
            [group, version, "namespaces", namespace, resource] => {
                Target::new(group, version, Some(*namespace), resource, None)
            }
            [group, version, "namespaces", namespace, resource, name] => {
                Target::new(group, version, Some(*namespace), resource, Some(*name))
            }
            [group, version, resource] => Target::new(group, version, None, resource, None),
            [group, version, resource, name] => {
                Target::new(group, version, None, resource, Some(*name))
            }
            _ => return Err(not_found()),
        };

        let storage = self.storage(&target.gvr).ok_or_else(not_found)?;
        if target.namespace.is_some() && !storage.namespace_scoped() {
            return Err(not_found());
        }
        self.handle_resource(target, storage, method, uri, headers, body)
            .await
    }

    async fn handle_resource(
        &self,
        target: Target,
        storage: Arc<dyn Storage>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, StatusError> {
        let resource = target.gvr.group_resource();
        let gvk = target.gvr.group_version().with_kind(storage.kind());

        let list_options: Option<ListOptions> = match (&method, &target.name) {
            (&Method::GET, None) => Some(self.parameter_codec.decode("ListOptions", &uri)?),
            _ => None,
        };
        let verb = match (&method, &target.name, &list_options) {
            (&Method::GET, None, Some(options)) if options.watch => "watch",
            (&Method::GET, None, _) => "list",
            (&Method::POST, None, _) => "create",
            (&Method::GET, Some(_), _) => "get",
            (&Method::PUT, Some(_), _) => "update",
            (&Method::DELETE, Some(_), _) => "delete",
            _ => {
                return Err(StatusError::MethodNotSupported {
                    resource,
                    verb: method.to_string(),
                })
            }
        };

        let user = self.admit(
            &headers,
            Attributes {
                verb: verb.to_string(),
                path: uri.path().to_string(),
                resource_request: true,
                group: target.gvr.group.clone(),
                version: target.gvr.version.clone(),
                resource: target.gvr.resource.clone(),
                namespace: target.namespace.clone().unwrap_or_default(),
                name: target.name.clone().unwrap_or_default(),
                ..Attributes::default()
            },
        )?;

        let cancel = CancelFlag::new();
        let _guard = CancelOnDrop(cancel.clone());
        let mut ctx = RequestContext::new()
            .namespace(target.namespace.clone().unwrap_or_default())
            .user(user)
            .cancel_flag(cancel);

        let unsupported = StatusError::MethodNotSupported {
            resource: resource.clone(),
            verb: verb.to_string(),
        };
        let name = target.name.clone().unwrap_or_default();

        match verb {
            "watch" => {
                let options = list_options.unwrap_or_default();
                let watcher = storage.watcher().ok_or(unsupported)?;
                let watch = watcher.watch(&ctx, &options)?;
                tracing::debug!(%resource, "watch started");
                self.watch_response(watch, gvk, options.timeout_seconds)
            }
            "list" => {
                let options = list_options.unwrap_or_default();
                if let Some(seconds) = options.timeout_seconds {
                    ctx = ctx.timeout(Duration::from_secs(seconds));
                }
                storage.lister().ok_or(unsupported.clone())?;
                let list = blocking(move || match storage.lister() {
                    Some(lister) => lister.list(&ctx, &options),
                    None => Err(unsupported),
                })
                .await?;
                Ok(json_response(StatusCode::OK, &self.codecs.encode_list(&gvk, list)?))
            }
            "get" => {
                let options: GetOptions = self.parameter_codec.decode("GetOptions", &uri)?;
                if let Some(seconds) = options.timeout_seconds {
                    ctx = ctx.timeout(Duration::from_secs(seconds));
                }
                storage.getter().ok_or(unsupported.clone())?;
                let object = blocking(move || match storage.getter() {
                    Some(getter) => getter.get(&ctx, &name, &options),
                    None => Err(unsupported),
                })
                .await?;
                Ok(json_response(StatusCode::OK, &self.codecs.encode(&gvk, object)?))
            }
            "create" => {
                storage.creater().ok_or(unsupported.clone())?;
                let object = self.codecs.decode(&gvk, &body)?;
                let created = blocking(move || match storage.creater() {
                    Some(creater) => creater.create(&ctx, object),
                    None => Err(unsupported),
                })
                .await?;
                Ok(json_response(StatusCode::CREATED, &self.codecs.encode(&gvk, created)?))
            }
            "update" => {
                storage.updater().ok_or(unsupported.clone())?;
                let object = self.codecs.decode(&gvk, &body)?;
                let (updated, created) = blocking(move || match storage.updater() {
                    Some(updater) => updater.update(&ctx, &name, object),
                    None => Err(unsupported),
                })
                .await?;
                let status = if created {
                    StatusCode::CREATED
                } else {
                    StatusCode::OK
                };
                Ok(json_response(status, &self.codecs.encode(&gvk, updated)?))
            }
            _ => {
                storage.deleter().ok_or(unsupported.clone())?;
                let options: DeleteOptions = if body.is_empty() {
                    DeleteOptions::default()
                } else {
                    serde_json::from_slice(&body).map_err(|e| {
                        StatusError::BadRequest(format!("invalid delete options: {}", e))
                    })?
                };
                let deleted = blocking(move || match storage.deleter() {
                    Some(deleter) => deleter.delete(&ctx, &name, &options),
                    None => Err(unsupported),
                })
                .await?;
                Ok(json_response(StatusCode::OK, &self.codecs.encode(&gvk, deleted)?))
            }
        }
    }

    fn watch_response(
        &self,
        watch: WatchStream,
        gvk: GroupVersionKind,
        timeout_seconds: Option<u64>,
    ) -> Result<Response, StatusError> {
        let deadline =
            timeout_seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
        let codecs = self.codecs.clone();

        let stream = futures::stream::unfold(watch, move |mut watch| {
            let codecs = codecs.clone();
            let gvk = gvk.clone();
            async move {
                let next = match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline, watch.next())
                        .await
                        .ok()
                        .flatten(),
                    None => watch.next().await,
                };
                let mut event = next?;
                if let Ok(object) = codecs.encode(&gvk, event.object.clone()) {
                    event.object = object;
                }
                let mut line = serde_json::to_vec(&event).unwrap_or_default();
                line.push(b'\n');
                Some((Ok::<Bytes, std::io::Error>(Bytes::from(line)), watch))
            }
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from_stream(stream))
            .map_err(|e| StatusError::Internal(e.to_string()))
    }
}

/// The resource a request addresses.
struct Target {
    gvr: GroupVersionResource,
    namespace: Option<String>,
    name: Option<String>,
}

impl Target {
    fn new(
        group: &str,
        version: &str,
        namespace: Option<&str>,
        resource: &str,
        name: Option<&str>,
    ) -> Self {
        Self {
            gvr: GroupVersionResource::new(group, version, resource),
            namespace: namespace.map(|n| n.to_string()),
            name: name.map(|n| n.to_string()),
        }
    }
}

/// Marks the request canceled when the handler future is dropped.
struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run a storage call on the blocking pool.
async fn blocking<R, F>(f: F) -> Result<R, StatusError>
where
    F: FnOnce() -> Result<R, StatusError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StatusError::Internal(format!("storage call failed: {}", e)))?
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (status, Json(body)).into_response()
}

fn error_response(err: &StatusError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::warn!(code = err.status_code(), error = %err, "request failed");
    }
    json_response(status, &err.to_status())
}

/// `GET /healthz`, `/livez`, `/readyz`.
async fn health_handler(
    State(server): State<Arc<GenericApiServer>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match server.admit_path(&headers, uri.path()) {
        Ok(_) => "ok".into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /version`.
async fn version_handler(
    State(server): State<Arc<GenericApiServer>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    match server.admit_path(&headers, uri.path()) {
        Ok(_) => json_response(StatusCode::OK, &server.version),
        Err(e) => error_response(&e),
    }
}

/// `GET /apis`.
async fn group_list_handler(
    State(server): State<Arc<GenericApiServer>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = server.admit_path(&headers, uri.path()) {
        return error_response(&e);
    }
    let groups: Vec<ApiGroup> = server
        .groups
        .keys()
        .filter_map(|g| server.group_discovery(g))
        .collect();
    json_response(StatusCode::OK, &ApiGroupList::new(groups))
}

/// Everything under `/apis/`.
async fn api_handler(
    State(server): State<Arc<GenericApiServer>>,
    Path(path): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match server.handle_api(&path, method, uri, headers, body).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}
