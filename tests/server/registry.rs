//! Registration, config completion and folding.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use apiserver_runtime::server::{fold_storage, Config, ServerOption, StorageInfo};
use apiserver_runtime::{
    ApiServerBase, ConfigError, GroupVersionResource, List, Stage, StorageBuilder,
};
use proptest::prelude::*;

use crate::support::{demo_base, demos, install, Demo, DemoGetter};

#[test]
fn duplicate_registration_keeps_the_first() {
    let mut base = ApiServerBase::new();
    base.with_scheme(&[install])
        .unwrap()
        .with_storage(demos(), Arc::new(DemoGetter))
        .unwrap();

    let err = base
        .with_store(
            demos(),
            StorageBuilder::<Demo>::new()
                .with_new_func(Demo::default)
                .with_new_list_func(List::default)
                .build(),
        )
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::DuplicateStorage(_)));
    assert!(err.to_string().contains("demos"));

    let server = base.server().unwrap();
    let storage = server.storage(&demos()).unwrap();
    assert!(storage.getter().is_some());
    assert!(storage.creater().is_none());
}

struct Counting(Arc<AtomicUsize>);

impl ServerOption for Counting {
    fn name(&self) -> &str {
        "counting"
    }

    fn apply_to(&self, config: Config) -> Result<Config, ConfigError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(config)
    }
}

#[test]
fn config_is_completed_once() {
    let applied = Arc::new(AtomicUsize::new(0));
    let mut base = demo_base();
    let options = base.options().clone().with_extra(Arc::new(Counting(Arc::clone(&applied))));
    base.with_options(options).unwrap();

    let first = base.config().unwrap();
    let second = base.config().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(applied.load(Ordering::SeqCst), 1);
    assert_eq!(base.stage(), Stage::ConfigCompleted);
    assert_eq!(first.storage().len(), 2);
}

struct Failing;

impl ServerOption for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn validate(&self) -> Vec<String> {
        vec!["always wrong".to_string()]
    }

    fn apply_to(&self, config: Config) -> Result<Config, ConfigError> {
        Ok(config)
    }
}

#[test]
fn option_validation_errors_are_aggregated() {
    let mut base = demo_base();
    base.options_mut().features.enable_profiling = false;
    base.options_mut().features.enable_contention_profiling = true;
    base.options_mut().extra.push(Arc::new(Failing));

    match base.config().err().unwrap() {
        ConfigError::InvalidOptions(problems) => {
            assert_eq!(problems.len(), 2);
            assert!(problems[1].starts_with("failing: "));
        }
        other => panic!("expected InvalidOptions, got {:?}", other),
    }

    // Nothing was cached; fixing the options lets completion succeed.
    base.options_mut().extra.clear();
    base.options_mut().features.enable_contention_profiling = false;
    assert!(base.config().is_ok());
}

fn segment() -> impl Strategy<Value = String> {
    "[a-z]{1,3}"
}

proptest! {
    #[test]
    fn distinct_registrations_fold_exactly(
        triples in proptest::collection::btree_set((segment(), segment(), segment()), 1..12)
    ) {
        let bindings: Vec<StorageInfo> = triples
            .iter()
            .map(|(g, v, r)| StorageInfo {
                gvr: GroupVersionResource::new(g.as_str(), v.as_str(), r.as_str()),
                storage: Arc::new(DemoGetter),
            })
            .collect();

        let groups = fold_storage(&bindings).unwrap();

        let mut folded = BTreeSet::new();
        for (name, info) in &groups {
            prop_assert_eq!(name, &info.name);
            for (version, resources) in &info.versioned_resources {
                for resource in resources.keys() {
                    folded.insert((name.clone(), version.clone(), resource.clone()));
                }
            }
        }
        prop_assert_eq!(folded, triples);
    }
}
