//! Concurrent writers against one store.

use std::sync::Barrier;
use std::thread;

use apiserver_runtime::StatusError;

use crate::support::{builder, ctx, demo_store, store_from, Demo, Unconditional};

const WRITERS: usize = 8;

#[test]
fn racing_updates_from_one_read_have_a_single_winner() {
    let store = demo_store();
    let created = store.create(&ctx("bar"), Demo::new("foo", "one")).unwrap();
    let barrier = Barrier::new(WRITERS);

    let results: Vec<(usize, Result<Demo, StatusError>)> = thread::scope(|s| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let mut next = created.clone();
                next.spec.message = format!("writer-{}", i);
                let store = &store;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let result = store.update(&ctx("bar"), "foo", next).map(|(obj, _)| obj);
                    (i, result)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<&(usize, Result<Demo, StatusError>)> =
        results.iter().filter(|(_, r)| r.is_ok()).collect();
    assert_eq!(winners.len(), 1);
    let (winner, updated) = winners[0];
    let updated = updated.as_ref().unwrap();
    assert_eq!(updated.metadata.resource_version, "2");

    for (_, result) in results.iter().filter(|(_, r)| r.is_err()) {
        assert!(result.as_ref().unwrap_err().is_conflict());
    }

    let current = store.get(&ctx("bar"), "foo").unwrap();
    assert_eq!(current.metadata.resource_version, "2");
    assert_eq!(current.spec.message, format!("writer-{}", winner));
}

#[test]
fn racing_create_on_update_loses_with_a_conflict() {
    let store = store_from(builder().with_update_strategy(Unconditional));
    let barrier = Barrier::new(WRITERS);

    let results: Vec<Result<(Demo, bool), StatusError>> = thread::scope(|s| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let store = &store;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    store.update(&ctx("bar"), "foo", Demo::new("foo", &format!("writer-{}", i)))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let created = results
        .iter()
        .filter(|r| matches!(r, Ok((_, true))))
        .count();
    assert_eq!(created, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(err.is_conflict(), "expected Conflict, got {:?}", err);
    }
    assert!(store.get(&ctx("bar"), "foo").is_ok());
}
