//! Properties of the scenario ledger over longer, branching histories.

use chrono::Duration;
use std::sync::Arc;
use wargame_core::hash::hash_snapshot;
use wargame_core::ledger::{Ledger, LedgerError, LedgerNode};
use wargame_core::state::PrivateLedger;
use wargame_core::testing::sample_briefing;
use wargame_core::{ContentHash, StateSnapshot};

fn root_snapshot() -> StateSnapshot {
    let briefing = sample_briefing();
    StateSnapshot::opening(
        "Scenario: Overlord",
        briefing.narrative_briefing,
        briefing.private_ledger,
        briefing.start_date_time,
    )
}

fn round(parent: &LedgerNode, label: &str) -> StateSnapshot {
    let snapshot = parent.snapshot();
    snapshot.advance(
        format!("ACTION Alice: {label}\nOutcome: done"),
        format!("Narration of {label}"),
        PrivateLedger::new(Vec::new(), label),
        snapshot.current_date_time + Duration::hours(1),
    )
}

/// root -> a -> b, with a second branch root -> c.
fn branching() -> (Ledger, Vec<Arc<LedgerNode>>) {
    let mut ledger = Ledger::new();
    let root = ledger.commit_root(root_snapshot()).unwrap();
    let a = ledger.commit_child(&root, round(&root, "a")).unwrap();
    let b = ledger.commit_child(&a, round(&a, "b")).unwrap();
    let c = ledger.commit_child(&root, round(&root, "c")).unwrap();
    (ledger, vec![root, a, b, c])
}

#[test]
fn test_identity_is_deterministic() {
    let snapshot = root_snapshot();
    assert_eq!(
        hash_snapshot(&snapshot).unwrap(),
        hash_snapshot(&snapshot.clone()).unwrap()
    );

    let mut ledger = Ledger::new();
    let root = ledger.commit_root(snapshot).unwrap();
    let first = ledger.commit_child(&root, round(&root, "a")).unwrap();
    let second = ledger.commit_child(&root, round(&root, "a")).unwrap();
    assert_eq!(first.hash(), second.hash());
    assert_eq!(ledger.len(), 2);
}

#[test]
fn test_commits_never_change_earlier_nodes() {
    let (mut ledger, nodes) = branching();
    let before: Vec<(ContentHash, StateSnapshot)> = nodes
        .iter()
        .map(|n| (n.hash(), n.snapshot().clone()))
        .collect();

    let mut cursor = Arc::clone(&nodes[2]);
    for i in 0..10 {
        cursor = ledger
            .commit_child(&cursor, round(&cursor, &format!("extra {i}")))
            .unwrap();
    }

    for (hash, snapshot) in before {
        let node = ledger.find_by_hash(&hash).unwrap();
        assert_eq!(node.hash(), hash);
        assert_eq!(node.snapshot(), &snapshot);
        node.verify().unwrap();
    }
}

#[test]
fn test_rollback_is_non_destructive() {
    let (ledger, nodes) = branching();
    let (root, a, b, c) = (&nodes[0], &nodes[1], &nodes[2], &nodes[3]);

    assert_eq!(ledger.rollback(b, None).unwrap().hash(), a.hash());
    assert_eq!(ledger.rollback(b, Some(&c.hash())).unwrap().hash(), c.hash());
    assert_eq!(ledger.rollback(c, Some(&b.hash())).unwrap().hash(), b.hash());
    assert_eq!(ledger.rollback(a, None).unwrap().hash(), root.hash());

    for node in &nodes {
        assert!(ledger.find_by_hash(&node.hash()).is_some());
    }
}

#[test]
fn test_rollback_failures() {
    let (ledger, nodes) = branching();
    let root = &nodes[0];

    assert!(matches!(ledger.rollback(root, None), Err(LedgerError::AtRoot(_))));

    let unknown = ContentHash::from_bytes([0xab; 32]);
    let err = ledger.rollback(root, Some(&unknown)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_tree_navigation() {
    let (ledger, nodes) = branching();
    let (root, a, b, c) = (&nodes[0], &nodes[1], &nodes[2], &nodes[3]);

    let kids: Vec<_> = ledger.children(&root.hash()).iter().map(|n| n.hash()).collect();
    assert_eq!(kids, vec![a.hash(), c.hash()]);
    assert!(ledger.children(&b.hash()).is_empty());

    let path: Vec<_> = ledger.ancestry(&b.hash()).unwrap().iter().map(|n| n.hash()).collect();
    assert_eq!(path, vec![root.hash(), a.hash(), b.hash()]);

    assert_eq!(ledger.roots().len(), 1);
    let order: Vec<_> = ledger.nodes().map(|n| n.hash()).collect();
    assert_eq!(order, nodes.iter().map(|n| n.hash()).collect::<Vec<_>>());
}

#[test]
fn test_rebuild_from_nodes() {
    let (ledger, nodes) = branching();
    let stored: Vec<LedgerNode> = ledger.nodes().map(|n| (*n).clone()).collect();

    let rebuilt = Ledger::from_nodes(stored).unwrap();
    assert_eq!(rebuilt.len(), ledger.len());
    for node in &nodes {
        assert!(rebuilt.contains(&node.hash()));
    }
    assert_eq!(rebuilt.children(&nodes[0].hash()).len(), 2);
}

/// Re-point a stored node's parent link without touching its snapshot.
fn with_parent(node: &LedgerNode, parent: ContentHash) -> LedgerNode {
    let mut value = serde_json::to_value(node).unwrap();
    value["parent"] = serde_json::Value::String(parent.to_hex());
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_rebuild_rejects_parent_cycles() {
    let (ledger, nodes) = branching();

    let selfish = with_parent(&nodes[1], nodes[1].hash());
    assert!(selfish.verify().is_ok());
    assert!(matches!(
        Ledger::from_nodes(vec![selfish]),
        Err(LedgerError::Cycle(_))
    ));

    // root -> a -> b, with the root re-pointed at b
    let looped = vec![
        with_parent(&nodes[0], nodes[2].hash()),
        (*nodes[1]).clone(),
        (*nodes[2]).clone(),
    ];
    assert!(matches!(Ledger::from_nodes(looped), Err(LedgerError::Cycle(_))));

    // A cycle hanging off an otherwise valid tree is still caught
    let mut stored: Vec<LedgerNode> = ledger.nodes().map(|n| (*n).clone()).collect();
    stored[3] = with_parent(&nodes[3], nodes[3].hash());
    assert!(matches!(Ledger::from_nodes(stored), Err(LedgerError::Cycle(_))));
}
