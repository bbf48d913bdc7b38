//! Create, get, update and delete through the generic store.

use apiserver_runtime::{DeleteOptions, StatusError};

use crate::support::{builder, ctx, demo_store, store_from, Demo, Strict, Unconditional};

#[test]
fn create_then_get() {
    let store = demo_store();
    let created = store.create(&ctx("bar"), Demo::new("foo", "hello")).unwrap();

    assert_eq!(created.metadata.name, "foo");
    assert_eq!(created.metadata.namespace, "bar");
    assert_eq!(created.metadata.resource_version, "1");
    assert!(!created.metadata.uid.is_empty());
    assert!(created.metadata.creation_timestamp.is_some());

    let fetched = store.get(&ctx("bar"), "foo").unwrap();
    assert_eq!(fetched.metadata, created.metadata);
    assert_eq!(fetched.spec, created.spec);
}

#[test]
fn create_existing_is_already_exists() {
    let store = demo_store();
    store.create(&ctx("bar"), Demo::new("foo", "a")).unwrap();
    let err = store.create(&ctx("bar"), Demo::new("foo", "b")).unwrap_err();
    assert!(matches!(err, StatusError::AlreadyExists { .. }));
    assert_eq!(err.status_code(), 409);

    // Same name in another namespace is a different object.
    store.create(&ctx("baz"), Demo::new("foo", "c")).unwrap();
}

#[test]
fn generate_name_fills_name() {
    let store = demo_store();
    let mut demo = Demo::new("", "generated");
    demo.metadata.generate_name = "demo-".to_string();
    let created = store.create(&ctx("bar"), demo).unwrap();
    assert!(created.metadata.name.starts_with("demo-"));
    assert!(created.metadata.name.len() > "demo-".len());
}

#[test]
fn mismatched_namespace_is_rejected() {
    let store = demo_store();
    let mut demo = Demo::new("foo", "a");
    demo.metadata.namespace = "other".to_string();
    assert!(store.create(&ctx("bar"), demo).is_err());
}

#[test]
fn update_bumps_version_and_keeps_identity() {
    let store = demo_store();
    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();

    let mut next = created.clone();
    next.spec.message = "two".to_string();
    let (updated, was_created) = store.update(&ctx("bar"), "foo", next).unwrap();

    assert!(!was_created);
    assert_eq!(updated.metadata.resource_version, "2");
    assert_eq!(updated.metadata.uid, created.metadata.uid);
    assert_eq!(updated.metadata.creation_timestamp, created.metadata.creation_timestamp);
    assert_eq!(updated.spec.message, "two");
}

#[test]
fn stale_update_conflicts_and_leaves_record_alone() {
    let store = demo_store();
    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();

    let mut first = created.clone();
    first.spec.message = "two".to_string();
    store.update(&ctx("bar"), "foo", first).unwrap();

    let mut stale = created.clone();
    stale.spec.message = "three".to_string();
    let err = store.update(&ctx("bar"), "foo", stale).unwrap_err();
    assert!(err.is_conflict());

    let current = store.get(&ctx("bar"), "foo").unwrap();
    assert_eq!(current.spec.message, "two");
    assert_eq!(current.metadata.resource_version, "2");
}

#[test]
fn update_without_version_is_invalid() {
    let store = demo_store();
    store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();

    let err = store
        .update(&ctx("bar"), "foo", Demo::new("foo", "two"))
        .unwrap_err();
    match err {
        StatusError::Invalid { causes, .. } => {
            assert_eq!(causes.len(), 1);
            assert_eq!(causes[0].field, "metadata.resourceVersion");
        }
        other => panic!("expected Invalid, got {:?}", other),
    }
}

#[test]
fn unconditional_update_ignores_version() {
    let store = store_from(builder().with_update_strategy(Unconditional));
    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();

    let mut stale = created.clone();
    stale.metadata.resource_version = "99".to_string();
    stale.spec.message = "two".to_string();
    let (updated, _) = store.update(&ctx("bar"), "foo", stale).unwrap();
    assert_eq!(updated.spec.message, "two");

    let (blind, _) = store
        .update(&ctx("bar"), "foo", Demo::new("foo", "three"))
        .unwrap();
    assert_eq!(blind.spec.message, "three");
}

#[test]
fn update_missing_creates_only_when_allowed() {
    let strict = demo_store();
    let err = strict
        .update(&ctx("bar"), "foo", Demo::new("foo", "one"))
        .unwrap_err();
    assert!(err.is_not_found());

    let lenient = store_from(builder().with_update_strategy(Unconditional));
    let (created, was_created) = lenient
        .update(&ctx("bar"), "foo", Demo::new("foo", "one"))
        .unwrap();
    assert!(was_created);
    assert_eq!(created.metadata.resource_version, "1");
}

#[test]
fn identical_update_is_a_no_op() {
    let store = demo_store();
    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();
    let (same, _) = store.update(&ctx("bar"), "foo", created.clone()).unwrap();
    assert_eq!(same.metadata.resource_version, created.metadata.resource_version);
}

#[test]
fn url_name_must_match_body() {
    let store = demo_store();
    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();
    let err = store.update(&ctx("bar"), "other", created).unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[test]
fn delete_then_get_is_not_found() {
    let store = demo_store();
    let missing = store
        .delete(&ctx("bar"), "foo", &DeleteOptions::default())
        .unwrap_err();
    assert!(missing.is_not_found());

    store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();
    let deleted = store
        .delete(&ctx("bar"), "foo", &DeleteOptions::default())
        .unwrap();
    assert_eq!(deleted.metadata.name, "foo");

    assert!(store.get(&ctx("bar"), "foo").unwrap_err().is_not_found());
}

#[test]
fn delete_preconditions_are_checked() {
    let store = demo_store();
    store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();

    let err = store
        .delete(&ctx("bar"), "foo", &DeleteOptions::with_resource_version("7"))
        .unwrap_err();
    assert!(err.is_conflict());

    store
        .delete(&ctx("bar"), "foo", &DeleteOptions::with_resource_version("1"))
        .unwrap();
}

#[test]
fn every_field_error_is_reported_in_order() {
    let store = store_from(builder().with_create_strategy(Strict));
    let mut demo = Demo::new("foo", "");
    demo.spec.replicas = 0;

    let err = store.create(&ctx("bar"), demo).unwrap_err();
    assert_eq!(err.status_code(), 422);
    match &err {
        StatusError::Invalid { kind, name, causes, .. } => {
            assert_eq!(kind, "Demo");
            assert_eq!(name, "foo");
            let fields: Vec<&str> = causes.iter().map(|c| c.field.as_str()).collect();
            assert_eq!(fields, vec!["spec.message", "spec.replicas"]);
        }
        other => panic!("expected Invalid, got {:?}", other),
    }

    let status = err.to_status();
    assert_eq!(status.code, 422);
    assert_eq!(status.details.unwrap().causes.len(), 2);
}

#[test]
fn canceled_request_never_reaches_the_backend() {
    let store = demo_store();
    let canceled = ctx("bar");
    canceled.cancel();
    let err = store.create(&canceled, Demo::new("foo", "one")).unwrap_err();
    assert!(matches!(err, StatusError::Canceled(_)));
    assert_eq!(err.status_code(), 499);
    assert!(store.get(&ctx("bar"), "foo").unwrap_err().is_not_found());
}
