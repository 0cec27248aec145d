mod common;

use common::{manager, round, CURRENT_ROUND};
use partkeyd_lib::{
    node::NodeParticipationClient,
    partkey::{manager::Error, AdmissionResult, Progress},
    testing::address,
};

#[test]
fn window_goes_from_request_to_generated() {
    let (node, mut manager) = manager(10, 10);
    let owner = address(1);

    assert_eq!(
        manager.request_generation(&owner, round(1100), round(2000), Some(100)),
        AdmissionResult::Accepted
    );

    let report = manager.refresh();
    assert!(report.is_clean());
    assert!(manager.is_generating());
    assert!(matches!(report.progress, Progress::Started(_)));

    let report = manager.refresh();
    assert!(matches!(report.progress, Progress::Waiting(_)));
    assert_eq!(node.generate_calls(), 1);

    assert!(node.complete_generation());
    let report = manager.refresh();
    assert!(matches!(report.progress, Progress::Completed(_)));
    assert!(!manager.is_generating());
    assert!(manager.pending().is_empty());

    let record = manager.generated().peek_next().unwrap();
    assert!(record.matches(&owner, round(1100), round(2000)));
    assert_eq!(record.vote_key_dilution, Some(100));
    assert!(record.node_id.is_some());
    assert!(record.key_material.is_some());

    assert_eq!(
        manager.request_generation(&owner, round(1100), round(2000), None),
        AdmissionResult::AlreadyGenerated
    );
}

#[test]
fn windows_are_generated_one_at_a_time_in_order() {
    let (node, mut manager) = manager(10, 10);
    for seed in 1..=3 {
        manager.request_generation(&address(seed), round(1100), round(2000), None);
    }

    let mut generated = Vec::new();
    for _ in 0..3 {
        manager.refresh();
        assert_eq!(node.generate_calls(), generated.len() + 1);
        node.complete_generation();
        match manager.refresh().progress {
            Progress::Completed(id) => generated.push(id.address),
            other => panic!("unexpected progress {:?}", other),
        }
    }
    assert_eq!(generated, vec![address(1), address(2), address(3)]);
    assert_eq!(manager.refresh().progress, Progress::Idle);
}

#[test]
fn admission_limits() {
    let (_node, mut manager) = manager(2, 1);
    let owner = address(7);

    assert_eq!(
        manager.request_generation(&owner, round(1), round(CURRENT_ROUND), None),
        AdmissionResult::WindowInPast
    );
    assert_eq!(
        manager.request_generation(&owner, round(1), round(1100), None),
        AdmissionResult::Accepted
    );
    assert_eq!(
        manager.request_generation(&owner, round(1), round(1100), None),
        AdmissionResult::AlreadyPending
    );
    assert_eq!(
        manager.request_generation(&owner, round(1), round(1200), None),
        AdmissionResult::Accepted
    );
    assert_eq!(
        manager.request_generation(&owner, round(1), round(1300), None),
        AdmissionResult::PendingFull
    );
}

#[test]
fn admission_rejected_while_generated_set_is_full() {
    let (node, mut manager) = manager(5, 1);
    node.insert_key(&address(1), round(1), round(5000));
    assert_eq!(manager.reconcile_from_node().unwrap(), 1);

    assert_eq!(
        manager.request_generation(&address(2), round(1), round(5000), None),
        AdmissionResult::GeneratedFull
    );
}

#[test]
fn node_outage_is_survived() {
    let (node, mut manager) = manager(10, 10);
    manager.request_generation(&address(1), round(1100), round(2000), None);

    node.set_unreachable(true);
    assert_eq!(
        manager.request_generation(&address(2), round(1100), round(2000), None),
        AdmissionResult::NodeUnreachable
    );
    let report = manager.refresh();
    assert!(!report.is_clean());
    assert_eq!(report.progress, Progress::Idle);
    assert_eq!(manager.pending().len(), 1);

    node.set_unreachable(false);
    let report = manager.refresh();
    assert!(report.is_clean());
    assert!(matches!(report.progress, Progress::Started(_)));
}

#[test]
fn rejected_generation_stays_pending() {
    let (node, mut manager) = manager(10, 10);
    manager.request_generation(&address(1), round(1100), round(2000), None);

    node.reject_generation("invalid dilution");
    let report = manager.refresh();
    assert!(matches!(report.failures.as_slice(), [Error::Node(_)]));
    assert!(!manager.is_generating());
    assert_eq!(manager.pending().len(), 1);

    node.accept_generation();
    assert!(matches!(manager.refresh().progress, Progress::Started(_)));
}

#[test]
fn restart_recovers_keys_from_node() {
    let (node, mut manager) = manager(10, 10);
    for seed in 1..=5 {
        node.insert_key(&address(seed), round(1), round(5000));
    }

    assert_eq!(manager.reconcile_from_node().unwrap(), 5);
    assert_eq!(manager.generated().len(), 5);
    assert_eq!(manager.reconcile_from_node().unwrap(), 0);
    assert_eq!(manager.generated().len(), 5);
    assert_eq!(
        manager.request_generation(&address(1), round(1), round(5000), None),
        AdmissionResult::AlreadyGenerated
    );
}

#[test]
fn reconciliation_stops_at_capacity() {
    let (node, mut manager) = manager(10, 3);
    for seed in 1..=5 {
        node.insert_key(&address(seed), round(1), round(5000));
    }

    assert!(matches!(
        manager.reconcile_from_node(),
        Err(Error::Buffer(_))
    ));
    assert_eq!(manager.generated().len(), 3);
}

#[test]
fn reconciliation_keeps_tracked_records() {
    let (node, mut manager) = manager(10, 10);
    for seed in 1..=2 {
        manager.request_generation(&address(seed), round(1100), round(2000), None);
        manager.refresh();
        node.complete_generation();
        manager.refresh();
    }
    assert_eq!(manager.generated().len(), 2);
    for seed in 3..=5 {
        node.insert_key(&address(seed), round(1), round(5000));
    }

    assert_eq!(manager.reconcile_from_node().unwrap(), 3);
    assert_eq!(manager.generated().len(), 5);
    assert_eq!(node.participation_keys().unwrap().len(), 5);
}

#[test]
fn expired_keys_are_pruned_but_kept_on_node() {
    let (node, mut manager) = manager(10, 10);
    node.insert_key(&address(1), round(1), round(1500));
    node.insert_key(&address(2), round(1), round(3000));
    manager.reconcile_from_node().unwrap();

    node.set_round(round(1500));
    let report = manager.refresh();
    assert_eq!(report.pruned, 1);
    assert_eq!(manager.generated().len(), 1);
    assert_eq!(node.keys().len(), 2);
    assert!(node.deleted_ids().is_empty());
}

#[test]
fn scheduled_deletion_removes_key_from_node() {
    let (node, mut manager) = manager(10, 10);
    manager.request_generation_with_deletion(
        &address(1),
        round(1100),
        round(5000),
        None,
        Some(round(2000)),
    );
    manager.refresh();
    node.complete_generation();
    manager.refresh();

    node.set_round(round(1999));
    assert_eq!(manager.refresh().deleted, 0);

    node.advance(1);
    let report = manager.refresh();
    assert_eq!(report.deleted, 1);
    assert!(manager.generated().is_empty());
    assert!(node.keys().is_empty());
    assert_eq!(node.deleted_ids().len(), 1);

    // the same window is not generated again
    assert_eq!(
        manager.request_generation_with_deletion(
            &address(1),
            round(1100),
            round(5000),
            None,
            Some(round(2000)),
        ),
        AdmissionResult::WindowInPast
    );
}

#[test]
fn delete_one_key() {
    let (node, mut manager) = manager(10, 10);
    let owner = address(3);
    node.insert_key(&owner, round(1), round(5000));
    manager.reconcile_from_node().unwrap();

    assert!(matches!(
        manager.delete_one(&owner, round(1), round(4000)),
        Err(Error::NotTracked { .. })
    ));
    manager.delete_one(&owner, round(1), round(5000)).unwrap();
    assert!(manager.generated().is_empty());
    assert!(node.keys().is_empty());
}

#[test]
fn delete_one_key_removed_behind_our_back() {
    let (node, mut manager) = manager(10, 10);
    let owner = address(3);
    let id = node.insert_key(&owner, round(1), round(5000));
    manager.reconcile_from_node().unwrap();
    assert!(node.remove_key(&id));

    assert!(matches!(
        manager.delete_one(&owner, round(1), round(5000)),
        Err(Error::NotYetGenerated { .. })
    ));
    assert_eq!(manager.generated().len(), 1);
}
