//! Test domain and server harness.

#![allow(dead_code)]

use std::sync::Arc;

use apiserver_runtime::rest::{Getter, Storage};
use apiserver_runtime::{
    ApiServerBase, GetOptions, GroupVersion, GroupVersionResource, List, Object, ObjectMeta,
    RequestContext, Scheme, StatusError, StorageBuilder,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const GROUP: &str = "examples.k8s.io";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemoSpec {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Object)]
#[object(kind = "Demo")]
pub struct Demo {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: DemoSpec,
}

pub fn install(scheme: &mut Scheme) {
    scheme.add_known_types(&GroupVersion::new(GROUP, "v1"), &["Demo", "DemoList"]);
    scheme.add_known_types(&GroupVersion::new(GROUP, "v1alpha1"), &["Demo"]);
}

pub fn demos() -> GroupVersionResource {
    GroupVersionResource::new(GROUP, "v1", "demos")
}

/// Serves made-up objects and nothing else.
pub struct DemoGetter;

impl Storage for DemoGetter {
    fn new_object(&self) -> Value {
        serde_json::json!({})
    }

    fn kind(&self) -> &str {
        "Demo"
    }

    fn namespace_scoped(&self) -> bool {
        true
    }

    fn getter(&self) -> Option<&dyn Getter> {
        Some(self)
    }
}

impl Getter for DemoGetter {
    fn get(&self, ctx: &RequestContext, name: &str, _: &GetOptions) -> Result<Value, StatusError> {
        Ok(serde_json::json!({
            "metadata": {
                "name": name,
                "namespace": ctx.namespace_value().unwrap_or_default(),
            },
            "spec": { "message": "some-demo-object" },
        }))
    }
}

/// A registry with a generic store at `v1/demos` and the getter at `v1alpha1/demos`.
pub fn demo_base() -> ApiServerBase {
    let mut base = ApiServerBase::new();
    base.with_scheme(&[install])
        .unwrap()
        .with_store(
            demos(),
            StorageBuilder::<Demo>::new()
                .with_new_func(Demo::default)
                .with_new_list_func(List::default)
                .build(),
        )
        .unwrap()
        .register_resource(GROUP, "v1alpha1", "demos", Arc::new(DemoGetter))
        .unwrap();
    base
}

/// Bind to port 0 and return the base URL.
pub async fn start_server(mut base: ApiServerBase) -> String {
    let server = base.server().unwrap();
    let app = server.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
