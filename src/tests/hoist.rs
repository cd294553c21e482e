use super::common::*;
use crate::tree::{BuildOptions, DependencyTree};
use std::collections::BTreeMap;

/// Fails if any version in use satisfies none of the nodes for its name.
fn assert_every_version_has_a_requester(tree: &DependencyTree) {
    let mut by_name: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for id in tree.pre_order() {
        by_name.entry(tree[id].name.as_str()).or_default().push(id);
    }
    for (name, nodes) in by_name {
        for id in &nodes {
            let count = tree.satisfies_count(&nodes, &tree[*id].resolved);
            assert!(count > 0, "{name}@{} has no requester", tree[*id].resolved);
        }
    }
}

#[tokio::test]
async fn example_scenario_hoists_both_packages() {
    let registry = Registry::new();
    registry
        .publish("a", "1.0.0", &[])
        .publish("a", "1.0.1", &[("b", "^2.0.0")])
        .publish("b", "2.0.0", &[])
        .publish("b", "2.1.0", &[]);
    let (mut tree, _) = build_tree(&registry, &[("a", "^1.0.0")], BuildOptions::default()).await;

    assert_eq!(tree.hoist().unwrap(), 0);
    assert_eq!(tree.render(), ["a@1.0.1", "b@2.1.0"]);
    assert!(tree.children_of(None).iter().all(|id| tree[*id].version_spec.is_none()));
}

#[tokio::test]
async fn tie_goes_to_the_first_version_seen() {
    let registry = Registry::new();
    registry
        .publish("a", "1.0.0", &[("b", "^1.0.0")])
        .publish("c", "1.0.0", &[("b", "^2.0.0")])
        .publish("b", "1.0.0", &[])
        .publish("b", "2.0.0", &[]);
    let (mut tree, _) = build_tree(&registry, &[("a", "^1.0.0"), ("c", "^1.0.0")], BuildOptions::default()).await;
    assert_every_version_has_a_requester(&tree);

    tree.hoist().unwrap();
    assert_eq!(tree.render(), ["a@1.0.0", "c@1.0.0", "  b@2.0.0", "b@1.0.0"]);
}

#[tokio::test]
async fn most_requested_version_wins_and_conflicts_stay_nested() {
    let registry = Registry::new();
    registry
        .publish("x", "1.0.0", &[("b", "^2.0.0")])
        .publish("y", "1.0.0", &[("b", "^1.0.0")])
        .publish("z", "1.0.0", &[("b", "~1.1.0")])
        .publish("b", "1.0.0", &[])
        .publish("b", "1.1.0", &[])
        .publish("b", "2.0.0", &[]);
    let deps = [("x", "^1.0.0"), ("y", "^1.0.0"), ("z", "^1.0.0")];
    let (mut tree, _) = build_tree(&registry, &deps, BuildOptions::default()).await;
    assert_every_version_has_a_requester(&tree);

    assert_eq!(tree.hoist().unwrap(), 1);
    assert_eq!(tree.render(), ["x@1.0.0", "  b@2.0.0", "y@1.0.0", "z@1.0.0", "b@1.1.0"]);
}

#[tokio::test]
async fn root_dependency_keeps_its_slot() {
    let registry = Registry::new();
    registry
        .publish("a", "1.0.0", &[("b", "^1.5.0")])
        .publish("c", "1.0.0", &[("b", "^1.5.0")])
        .publish("b", "1.0.0", &[])
        .publish("b", "1.5.0", &[]);
    let deps = [("a", "^1.0.0"), ("b", "1.0.0"), ("c", "^1.0.0")];
    let (mut tree, _) = build_tree(&registry, &deps, BuildOptions::default()).await;

    tree.hoist().unwrap();
    let root_bs = tree.children_of(None).iter().filter(|id| tree[**id].name == "b").count();
    assert_eq!(root_bs, 1);
    assert_eq!(tree.render(), ["a@1.0.0", "  b@1.5.0", "b@1.0.0", "c@1.0.0", "  b@1.5.0"]);
}

#[tokio::test]
async fn hoisting_twice_changes_nothing() {
    let registry = Registry::new();
    registry
        .publish("a", "1.0.0", &[("b", "^1.0.0"), ("d", "^1.0.0")])
        .publish("c", "1.0.0", &[("b", "^2.0.0"), ("d", "^1.0.0")])
        .publish("b", "1.0.0", &[("d", "^1.0.0")])
        .publish("b", "2.0.0", &[("d", "^2.0.0")])
        .publish("d", "1.0.0", &[])
        .publish("d", "2.0.0", &[]);
    let (mut tree, _) = build_tree(&registry, &[("a", "^1.0.0"), ("c", "^1.0.0")], BuildOptions::default()).await;

    tree.hoist().unwrap();
    let once = tree.render();
    assert_every_version_has_a_requester(&tree);
    assert_eq!(tree.hoist().unwrap(), 0);
    assert_eq!(tree.render(), once);
}
