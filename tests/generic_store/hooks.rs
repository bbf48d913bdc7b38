//! Post-mutation hooks run off the request path.

use std::sync::mpsc;
use std::time::Duration;

use apiserver_runtime::DeleteOptions;

use crate::support::{builder, ctx, store_from, Demo};

#[test]
fn hooks_see_committed_objects() {
    let (tx, rx) = mpsc::channel::<(String, String)>();
    let created_tx = tx.clone();
    let updated_tx = tx.clone();
    let deleted_tx = tx;

    let store = store_from(
        builder()
            .with_after_create_hook(move |demo: &Demo| {
                created_tx.send(("create".into(), demo.metadata.resource_version.clone()))?;
                Ok(())
            })
            .with_after_update_hook(move |demo: &Demo| {
                updated_tx.send(("update".into(), demo.metadata.resource_version.clone()))?;
                Ok(())
            })
            .with_after_delete_hook(move |demo: &Demo| {
                deleted_tx.send(("delete".into(), demo.metadata.name.clone()))?;
                Ok(())
            }),
    );

    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();
    let mut next = created.clone();
    next.spec.message = "two".into();
    store.update(&ctx("bar"), "foo", next).unwrap();
    store
        .delete(&ctx("bar"), "foo", &DeleteOptions::default())
        .unwrap();

    let timeout = Duration::from_secs(5);
    assert_eq!(rx.recv_timeout(timeout).unwrap(), ("create".into(), "1".into()));
    assert_eq!(rx.recv_timeout(timeout).unwrap(), ("update".into(), "2".into()));
    assert_eq!(rx.recv_timeout(timeout).unwrap(), ("delete".into(), "foo".into()));
}

#[test]
fn failing_hook_does_not_fail_the_request() {
    let store = store_from(
        builder().with_after_create_hook(|_: &Demo| Err("downstream unavailable".into())),
    );
    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();
    assert_eq!(created.metadata.resource_version, "1");
    assert!(store.get(&ctx("bar"), "foo").is_ok());
}
