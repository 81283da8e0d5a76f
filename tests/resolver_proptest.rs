//! Property tests for dependency ordering.
//!
//! Batches are generated as random DAGs (edges only point at lower indices)
//! and then shuffled, so the input order never gives the answer away.
use proptest::prelude::*;
use service_conductor::dependency::{order, ServiceDefinition};
use service_conductor::Error;
use std::collections::{HashMap, HashSet};

fn name(i: usize) -> String {
    format!("svc-{}", i)
}

/// Definitions for a DAG where node `i` may depend on any `j < i`.
fn dag_strategy() -> impl Strategy<Value = Vec<ServiceDefinition>> {
    (1usize..12)
        .prop_flat_map(|n| {
            (0..n)
                .map(|i| prop::collection::vec(any::<bool>(), i))
                .collect::<Vec<_>>()
        })
        .prop_map(|deps| {
            deps.iter()
                .enumerate()
                .map(|(i, picks)| {
                    picks
                        .iter()
                        .enumerate()
                        .filter(|(_, picked)| **picked)
                        .fold(ServiceDefinition::new(name(i), "img"), |def, (j, _)| {
                            def.depends_on(name(j), None)
                        })
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

/// Names that can never be placed: on a cycle, or depending on something
/// that can never be placed or does not exist.
fn unplaceable(defs: &[ServiceDefinition]) -> HashSet<String> {
    let deps: HashMap<&str, Vec<&str>> = defs
        .iter()
        .map(|d| (d.name.as_str(), d.dependency_names()))
        .collect();
    let mut placed: HashSet<&str> = HashSet::new();
    loop {
        let before = placed.len();
        for (svc, needs) in &deps {
            if needs.iter().all(|n| placed.contains(n)) {
                placed.insert(*svc);
            }
        }
        if placed.len() == before {
            break;
        }
    }
    defs.iter()
        .filter(|d| !placed.contains(d.name.as_str()))
        .map(|d| d.name.clone())
        .collect()
}

proptest! {
    #[test]
    fn acyclic_batches_respect_dependencies(batch in dag_strategy()) {
        let ordered = order(&batch).unwrap();
        prop_assert_eq!(ordered.len(), batch.len());

        let position: HashMap<&str, usize> = ordered
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.as_str(), i))
            .collect();
        for def in &ordered {
            for dep in def.dependency_names() {
                prop_assert!(position[dep] < position[def.name.as_str()]);
            }
        }
    }

    #[test]
    fn independent_services_keep_input_order(batch in dag_strategy()) {
        let roots: Vec<String> = batch
            .iter()
            .filter(|d| d.dependencies.is_empty())
            .map(|d| d.name.clone())
            .collect();
        let ordered_roots: Vec<String> = order(&batch)
            .unwrap()
            .into_iter()
            .filter(|d| d.dependencies.is_empty())
            .map(|d| d.name)
            .collect();
        prop_assert_eq!(roots, ordered_roots);
    }

    #[test]
    fn extra_edge_fails_exactly_when_something_is_stuck(
        batch in dag_strategy().prop_filter("needs two services", |b| b.len() >= 2),
        pick in any::<prop::sample::Index>(),
    ) {
        // svc-0 now waits on a later node; that closes a cycle only when the
        // later node already reaches svc-0.
        let target = name(1 + pick.index(batch.len() - 1));
        let batch: Vec<ServiceDefinition> = batch
            .into_iter()
            .map(|d| if d.name == name(0) { d.depends_on(target.clone(), None) } else { d })
            .collect();

        let expected = unplaceable(&batch);
        match order(&batch) {
            Ok(ordered) => {
                prop_assert!(expected.is_empty());
                prop_assert_eq!(ordered.len(), batch.len());
            }
            Err(Error::CycleOrMissingDependency(names)) => {
                prop_assert!(!expected.is_empty());
                let reported: HashSet<String> = names.into_iter().collect();
                prop_assert_eq!(reported, expected);
            }
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }

    #[test]
    fn dangling_reference_blocks_its_dependents(batch in dag_strategy()) {
        let mut batch = batch;
        let first = batch.remove(0).depends_on("missing", None);
        batch.insert(0, first);

        match order(&batch) {
            Err(Error::CycleOrMissingDependency(names)) => {
                let reported: HashSet<String> = names.into_iter().collect();
                prop_assert_eq!(reported, unplaceable(&batch));
            }
            other => prop_assert!(false, "expected missing dependency error, got {:?}", other.map(|o| o.len())),
        }
    }
}
