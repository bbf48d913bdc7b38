//! Demo API server.
//!
//! Serves `Demo` objects from `examples.k8s.io`:
//!
//! - `v1/demos` through a generic store backed by the in-memory backend.
//! - `v1alpha1/demos` through a getter-only storage that makes up objects.
//!
//! ```text
//! cargo run --example demo_server
//! curl -X POST localhost:8443/apis/examples.k8s.io/v1/namespaces/bar/demos \
//!     -d '{"apiVersion":"examples.k8s.io/v1","kind":"Demo","metadata":{"name":"foo"},"spec":{"message":"hi"}}'
//! curl localhost:8443/apis/examples.k8s.io/v1alpha1/namespaces/bar/demos/anything
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use apiserver_runtime::rest::{Getter, Storage};
use apiserver_runtime::strategy::validate_path_segment_name;
use apiserver_runtime::{
    ApiServerBase, CreateStrategy, DefaultStrategy, FieldError, FieldErrorList, FieldPath,
    GetOptions, GroupVersion, GroupVersionResource, List, Object, ObjectMeta, RequestContext,
    Scheme, StatusError, StorageBuilder, UpdateStrategy,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

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

fn install(scheme: &mut Scheme) {
    for version in ["v1", "v1alpha1"] {
        scheme.add_known_types(
            &GroupVersion::new("examples.k8s.io", version),
            &["Demo", "DemoList"],
        );
    }
}

/// Rejects messages that are not valid path segments.
struct DemoStrategy;

impl DemoStrategy {
    fn validate_spec(spec: &DemoSpec) -> FieldErrorList {
        let path = FieldPath::new("spec").child("message");
        validate_path_segment_name(&spec.message)
            .into_iter()
            .map(|msg| FieldError::invalid(&path, spec.message.clone(), msg))
            .collect()
    }
}

impl CreateStrategy<Demo> for DemoStrategy {
    fn namespace_scoped(&self) -> bool {
        true
    }

    fn validate(&self, _ctx: &RequestContext, obj: &Demo) -> FieldErrorList {
        Self::validate_spec(&obj.spec)
    }
}

impl UpdateStrategy<Demo> for DemoStrategy {
    fn namespace_scoped(&self) -> bool {
        true
    }

    fn allow_create_on_update(&self) -> bool {
        true
    }

    fn validate_update(&self, _ctx: &RequestContext, obj: &Demo, _old: &Demo) -> FieldErrorList {
        Self::validate_spec(&obj.spec)
    }

    fn allow_unconditional_update(&self) -> bool {
        false
    }
}

/// Answers every get with a made-up object.
struct DemoGetter;

impl Storage for DemoGetter {
    fn new_object(&self) -> Value {
        serde_json::json!({})
    }

    fn kind(&self) -> &str {
        Demo::KIND
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
        let demo = Demo {
            metadata: ObjectMeta::namespaced(ctx.namespace_value().unwrap_or_default(), name),
            spec: DemoSpec {
                message: "some-demo-object".to_string(),
            },
        };
        serde_json::to_value(demo).map_err(|e| StatusError::Internal(e.to_string()))
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut base = ApiServerBase::new();
    base.with_scheme(&[install])?
        .register_resource("examples.k8s.io", "v1alpha1", "demos", Arc::new(DemoGetter))?
        .with_store(
            GroupVersionResource::new("examples.k8s.io", "v1", "demos"),
            StorageBuilder::<Demo>::new()
                .with_new_func(Demo::default)
                .with_new_list_func(List::default)
                .with_create_strategy(DemoStrategy)
                .with_update_strategy(DemoStrategy)
                .with_delete_strategy(DefaultStrategy::namespaced())
                .with_after_create_hook(|demo: &Demo| {
                    tracing::info!(name = %demo.metadata.name, "demo created");
                    Ok(())
                })
                .build(),
        )?;

    let port = std::env::var("DEMO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8443);
    base.options_mut().secure_serving.bind_port = port;

    base.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("unable to run apiserver: {}", e);
            ExitCode::FAILURE
        }
    }
}
