//! End-to-end HTTP tests: start the server and drive it with reqwest.

use std::sync::Arc;

use apiserver_runtime::server::{
    Attributes, Authorizer, Decision, DelegatingAuthorizationOptions, RequestHeaderOptions,
};
use serde_json::{json, Value};

use crate::support::{demo_base, start_server};

const DEMOS: &str = "/apis/examples.k8s.io/v1/namespaces/bar/demos";

fn demo(name: &str, message: &str) -> Value {
    json!({
        "apiVersion": "examples.k8s.io/v1",
        "kind": "Demo",
        "metadata": { "name": name },
        "spec": { "message": message },
    })
}

#[tokio::test]
async fn create_update_conflict() {
    let base = start_server(demo_base()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}{DEMOS}"))
        .json(&demo("foo", "one"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(created["kind"], "Demo");
    assert_eq!(created["apiVersion"], "examples.k8s.io/v1");
    assert_eq!(created["metadata"]["name"], "foo");
    assert_eq!(created["metadata"]["namespace"], "bar");
    assert_eq!(created["metadata"]["resourceVersion"], "1");

    let mut update = created.clone();
    update["spec"]["message"] = json!("two");
    let resp = client
        .put(format!("{base}{DEMOS}/foo"))
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["metadata"]["resourceVersion"], "2");
    assert_eq!(updated["spec"]["message"], "two");

    let mut stale = created.clone();
    stale["spec"]["message"] = json!("three");
    let resp = client
        .put(format!("{base}{DEMOS}/foo"))
        .json(&stale)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["kind"], "Status");
    assert_eq!(status["status"], "Failure");
    assert_eq!(status["reason"], "Conflict");
    assert_eq!(status["code"], 409);

    let fetched: Value = client
        .get(format!("{base}{DEMOS}/foo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["spec"]["message"], "two");
}

#[tokio::test]
async fn list_and_delete() {
    let base = start_server(demo_base()).await;
    let client = reqwest::Client::new();

    for name in ["a", "b"] {
        let resp = client
            .post(format!("{base}{DEMOS}"))
            .json(&demo(name, "x"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    let list: Value = client
        .get(format!("{base}{DEMOS}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list["kind"], "DemoList");
    assert_eq!(list["items"].as_array().unwrap().len(), 2);

    let page: Value = client
        .get(format!("{base}{DEMOS}?limit=1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert!(page["metadata"]["continue"].is_string());

    let resp = client
        .delete(format!("{base}{DEMOS}/a"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let deleted: Value = resp.json().await.unwrap();
    assert_eq!(deleted["metadata"]["name"], "a");

    let resp = client
        .get(format!("{base}{DEMOS}/a"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["reason"], "NotFound");
}

#[tokio::test]
async fn invalid_body_is_rejected() {
    let base = start_server(demo_base()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}{DEMOS}"))
        .json(&json!({ "kind": "Other", "metadata": { "name": "foo" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}{DEMOS}"))
        .json(&json!({ "metadata": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["reason"], "Invalid");
    assert_eq!(status["details"]["causes"][0]["field"], "metadata.name");
}

#[tokio::test]
async fn getter_only_storage() {
    let base = start_server(demo_base()).await;
    let client = reqwest::Client::new();
    let url = format!("{base}/apis/examples.k8s.io/v1alpha1/namespaces/bar/demos");

    let got: Value = client
        .get(format!("{url}/anything"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(got["kind"], "Demo");
    assert_eq!(got["apiVersion"], "examples.k8s.io/v1alpha1");
    assert_eq!(got["metadata"]["name"], "anything");
    assert_eq!(got["metadata"]["namespace"], "bar");

    let resp = client
        .post(&url)
        .json(&json!({ "metadata": { "name": "foo" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 405);

    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.status(), 405);
}

#[tokio::test]
async fn discovery() {
    let base = start_server(demo_base()).await;
    let client = reqwest::Client::new();

    let groups: Value = client
        .get(format!("{base}/apis"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(groups["kind"], "APIGroupList");
    assert_eq!(groups["groups"][0]["name"], "examples.k8s.io");
    assert_eq!(groups["groups"][0]["preferredVersion"]["version"], "v1");

    let group: Value = client
        .get(format!("{base}/apis/examples.k8s.io"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(group["versions"].as_array().unwrap().len(), 2);

    let resources: Value = client
        .get(format!("{base}/apis/examples.k8s.io/v1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resources["groupVersion"], "examples.k8s.io/v1");
    let demos = &resources["resources"][0];
    assert_eq!(demos["name"], "demos");
    assert_eq!(demos["kind"], "Demo");
    assert_eq!(demos["namespaced"], true);
    assert_eq!(
        demos["verbs"],
        json!(["create", "delete", "get", "list", "update", "watch"])
    );

    let alpha: Value = client
        .get(format!("{base}/apis/examples.k8s.io/v1alpha1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alpha["resources"][0]["verbs"], json!(["get"]));

    let resp = client
        .get(format!("{base}/apis/missing.k8s.io"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn health_and_version() {
    let base = start_server(demo_base()).await;
    let client = reqwest::Client::new();

    for path in ["/healthz", "/livez", "/readyz"] {
        let resp = client.get(format!("{base}{path}")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    let version: Value = client
        .get(format!("{base}/version"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(version["major"], "1");
    assert_eq!(version["minor"], "0");
}

struct DenyAll;

impl Authorizer for DenyAll {
    fn authorize(&self, _attributes: &Attributes) -> Decision {
        Decision::Deny("denied".to_string())
    }
}

#[tokio::test]
async fn identity_headers_need_a_trusted_proxy() {
    let mut locked = demo_base();
    locked.options_mut().authorization =
        DelegatingAuthorizationOptions::default().with_delegate(Arc::new(DenyAll));
    let base = start_server(locked).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}{DEMOS}"))
        .header("X-Remote-User", "mallory")
        .header("X-Remote-Group", "system:masters")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["reason"], "Forbidden");
    assert!(status["message"]
        .as_str()
        .unwrap()
        .contains("system:anonymous"));

    let mut proxied = demo_base();
    proxied.options_mut().authentication.request_header = RequestHeaderOptions::remote_headers();
    proxied.options_mut().authorization =
        DelegatingAuthorizationOptions::default().with_delegate(Arc::new(DenyAll));
    let base = start_server(proxied).await;
    let resp = client
        .get(format!("{base}{DEMOS}"))
        .header("X-Remote-User", "admin")
        .header("X-Remote-Group", "system:masters")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn watch_streams_events() {
    let base = start_server(demo_base()).await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}{DEMOS}"))
        .json(&demo("foo", "one"))
        .send()
        .await
        .unwrap();

    let body = client
        .get(format!("{base}{DEMOS}?watch=true&timeoutSeconds=1"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let events: Vec<Value> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "ADDED");
    assert_eq!(events[0]["object"]["kind"], "Demo");
    assert_eq!(events[0]["object"]["metadata"]["name"], "foo");
}
