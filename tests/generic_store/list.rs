//! Listing with selectors and paging.

use apiserver_runtime::{ListOptions, ObjectList, RequestContext, StatusError};

use crate::support::{ctx, demo_store, Demo};

fn names(list: &apiserver_runtime::List<Demo>) -> Vec<String> {
    list.items().iter().map(|d| d.metadata.name.clone()).collect()
}

fn seeded() -> apiserver_runtime::Store<Demo> {
    let store = demo_store();
    store
        .create(&ctx("bar"), Demo::new("a", "x").labeled("app", "web"))
        .unwrap();
    store
        .create(&ctx("bar"), Demo::new("b", "x").labeled("app", "db"))
        .unwrap();
    store
        .create(&ctx("bar"), Demo::new("c", "x").labeled("app", "web"))
        .unwrap();
    store
        .create(&ctx("baz"), Demo::new("d", "x").labeled("app", "web"))
        .unwrap();
    store
}

#[test]
fn list_is_scoped_to_the_namespace() {
    let store = seeded();
    let list = store.list(&ctx("bar"), &ListOptions::default()).unwrap();
    assert_eq!(names(&list), vec!["a", "b", "c"]);
    assert_eq!(list.metadata.resource_version, "4");
    assert!(list.metadata.continue_token.is_empty());
}

#[test]
fn list_without_namespace_spans_all() {
    let store = seeded();
    let list = store
        .list(&RequestContext::new(), &ListOptions::default())
        .unwrap();
    assert_eq!(list.items.len(), 4);
}

#[test]
fn label_selector_filters() {
    let store = seeded();
    let options = ListOptions {
        label_selector: Some("app=web".into()),
        ..ListOptions::default()
    };
    let list = store.list(&ctx("bar"), &options).unwrap();
    assert_eq!(names(&list), vec!["a", "c"]);

    let options = ListOptions {
        label_selector: Some("app!=web".into()),
        ..ListOptions::default()
    };
    let list = store.list(&ctx("bar"), &options).unwrap();
    assert_eq!(names(&list), vec!["b"]);
}

#[test]
fn field_selector_on_name() {
    let store = seeded();
    let options = ListOptions {
        field_selector: Some("metadata.name=b".into()),
        ..ListOptions::default()
    };
    let list = store.list(&ctx("bar"), &options).unwrap();
    assert_eq!(names(&list), vec!["b"]);
}

#[test]
fn pages_follow_continue_tokens() {
    let store = seeded();
    let first = store
        .list(
            &ctx("bar"),
            &ListOptions {
                limit: Some(2),
                ..ListOptions::default()
            },
        )
        .unwrap();
    assert_eq!(names(&first), vec!["a", "b"]);
    assert_eq!(first.metadata.remaining_item_count, Some(1));
    assert!(!first.metadata.continue_token.is_empty());

    let second = store
        .list(
            &ctx("bar"),
            &ListOptions {
                limit: Some(2),
                continue_token: Some(first.metadata.continue_token.clone()),
                ..ListOptions::default()
            },
        )
        .unwrap();
    assert_eq!(names(&second), vec!["c"]);
    assert!(second.metadata.continue_token.is_empty());
}

#[test]
fn garbage_continue_token_is_bad_request() {
    let store = seeded();
    let err = store
        .list(
            &ctx("bar"),
            &ListOptions {
                continue_token: Some("not-a-token".into()),
                ..ListOptions::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StatusError::BadRequest(_)));
}
