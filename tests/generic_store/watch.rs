//! Watching a generic store.

use std::time::Duration;

use apiserver_runtime::storage::{EventType, WatchEvent, WatchStream};
use apiserver_runtime::{DeleteOptions, ListOptions};

use crate::support::{ctx, demo_store, Demo};

async fn next(watch: &mut WatchStream) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(5), watch.next())
        .await
        .expect("timed out waiting for a watch event")
        .expect("watch ended")
}

#[tokio::test]
async fn watch_sees_existing_then_live_changes() {
    let store = demo_store();
    store.create(&ctx("bar"), Demo::new("a", "one")).unwrap();

    let mut watch = store.watch(&ctx("bar"), &ListOptions::default()).unwrap();

    let initial = next(&mut watch).await;
    assert_eq!(initial.event_type, EventType::Added);
    assert_eq!(initial.object["metadata"]["name"], "a");
    assert_eq!(initial.object["metadata"]["resourceVersion"], "1");

    let created = store.create(&ctx("bar"), Demo::new("b", "one")).unwrap();
    let added = next(&mut watch).await;
    assert_eq!(added.event_type, EventType::Added);
    assert_eq!(added.object["metadata"]["name"], "b");

    let mut changed = created.clone();
    changed.spec.message = "two".into();
    store.update(&ctx("bar"), "b", changed).unwrap();
    let modified = next(&mut watch).await;
    assert_eq!(modified.event_type, EventType::Modified);
    assert_eq!(modified.object["spec"]["message"], "two");
    assert_eq!(modified.object["metadata"]["resourceVersion"], "3");

    store
        .delete(&ctx("bar"), "b", &DeleteOptions::default())
        .unwrap();
    assert_eq!(next(&mut watch).await.event_type, EventType::Deleted);
}

#[tokio::test]
async fn watch_ignores_other_namespaces() {
    let store = demo_store();
    let mut watch = store.watch(&ctx("bar"), &ListOptions::default()).unwrap();

    store.create(&ctx("baz"), Demo::new("elsewhere", "x")).unwrap();
    store.create(&ctx("bar"), Demo::new("here", "x")).unwrap();

    let event = next(&mut watch).await;
    assert_eq!(event.object["metadata"]["name"], "here");
}

#[tokio::test]
async fn watch_from_version_replays_later_changes() {
    let store = demo_store();
    store.create(&ctx("bar"), Demo::new("a", "x")).unwrap();
    store.create(&ctx("bar"), Demo::new("b", "x")).unwrap();
    store.create(&ctx("bar"), Demo::new("c", "x")).unwrap();

    let options = ListOptions {
        resource_version: Some("1".into()),
        watch: true,
        ..ListOptions::default()
    };
    let mut watch = store.watch(&ctx("bar"), &options).unwrap();

    let names: Vec<String> = watch
        .ready_events()
        .into_iter()
        .map(|e| e.object["metadata"]["name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["b", "c"]);
}

#[tokio::test]
async fn label_filtered_watch_reports_objects_leaving_the_selection() {
    let store = demo_store();
    let created = store
        .create(&ctx("bar"), Demo::new("a", "x").labeled("app", "web"))
        .unwrap();

    let options = ListOptions {
        label_selector: Some("app=web".into()),
        ..ListOptions::default()
    };
    let mut watch = store.watch(&ctx("bar"), &options).unwrap();
    assert_eq!(next(&mut watch).await.event_type, EventType::Added);

    let mut relabeled = created.clone();
    relabeled.metadata.labels.insert("app".into(), "db".into());
    store.update(&ctx("bar"), "a", relabeled).unwrap();

    assert_eq!(next(&mut watch).await.event_type, EventType::Deleted);
}
