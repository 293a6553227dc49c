//! End-to-end reconciliation scenarios between replicas.
//!
//! Each test walks two or three replicas through a sequence of local writes
//! and pairwise exchanges, checking the decision at every exchange and the
//! final clock states. Replica 10 plays the role of the first writer
//! throughout; epochs are the replicas' own modification counters.

use pairsync_core::{sync, sync_to_missing, Action, Clock, ReplicaId};

const A: ReplicaId = ReplicaId(10);
const B: ReplicaId = ReplicaId(11);

#[test]
fn fresh_object_propagates_then_update_flows_back() {
    let mut a = Clock::create(A, 1);
    let mut b = Clock::default();

    assert_eq!(sync(&a, &b), Action::Copy);
    b.resolve_theirs(&a);

    a.update(A, 3);
    assert_eq!(sync(&b, &a), Action::Nothing);
    a.resolve_ours(&b);

    assert_eq!(a.to_string(), "{sync{10:3} mod{10:3} create{10:1}}");
    assert_eq!(b.to_string(), "{sync{10:1} mod{10:1} create{10:1}}");

    a.validate();
    b.validate();
}

#[test]
fn causally_ordered_edit_copies_back_without_conflict() {
    let mut a = Clock::create(A, 1);
    let mut b = Clock::default();

    assert_eq!(sync(&a, &b), Action::Copy);
    b.resolve_theirs(&a);

    // The second replica edits on top of what it adopted; the originator
    // must take the edit cleanly.
    b.update(B, 3);
    assert_eq!(sync(&b, &a), Action::Copy);
    a.resolve_theirs(&b);

    assert_eq!(a.to_string(), "{sync{10:1 11:3} mod{10:1 11:3} create{10:1}}");
    assert_eq!(b.to_string(), "{sync{10:1 11:3} mod{10:1 11:3} create{10:1}}");

    a.validate();
    b.validate();
}

#[test]
fn divergent_edits_conflict_and_comparison_mutates_nothing() {
    let mut a = Clock::create(A, 1);
    let mut b = Clock::default();

    assert_eq!(sync(&a, &b), Action::Copy);
    b.resolve_theirs(&a);

    a.update(A, 3);
    b.update(B, 3);
    assert_eq!(sync(&b, &a), Action::Conflict);

    // The comparison itself left both clocks alone.
    assert_eq!(a.to_string(), "{sync{10:3} mod{10:3} create{10:1}}");
    assert_eq!(b.to_string(), "{sync{10:1 11:3} mod{10:1 11:3} create{10:1}}");

    a.validate();
    b.validate();
}

#[test]
fn conflict_symmetry_and_idempotent_nothing() {
    let mut a = Clock::create(A, 1);
    let mut b = a.clone();
    a.update(A, 3);
    b.update(B, 3);

    // Both directions see mutual novelty.
    assert_eq!(sync(&a, &b), Action::Conflict);
    assert_eq!(sync(&b, &a), Action::Conflict);

    // Asymmetry after adoption: Copy one way, then Nothing the other.
    let mut c = Clock::default();
    assert_eq!(sync(&a, &c), Action::Copy);
    c.resolve_theirs(&a);
    assert_eq!(sync(&c, &a), Action::Nothing);

    // Nothing stays Nothing once recorded.
    a.resolve_ours(&c);
    assert_eq!(sync(&c, &a), Action::Nothing);
    a.validate();
    b.validate();
    c.validate();
}

/// Three replicas, conflict resolved by taking the remote side.
#[test]
fn conflict_resolved_remote_converges_for_bystanders() {
    let mut a = Clock::default();
    let mut b = Clock::default();
    let mut c = Clock::default();

    b.update(B, 1);
    assert_eq!(sync(&b, &a), Action::Copy);
    a.resolve_theirs(&b);
    assert_eq!(sync(&b, &c), Action::Copy);
    c.resolve_theirs(&b);

    a.update(A, 3);
    b.update(B, 3);
    assert_eq!(sync(&a, &b), Action::Conflict);
    b.resolve_theirs(&a);

    assert_eq!(sync(&a, &b), Action::Nothing);
    // The bystander's stale state carries nothing new either.
    assert_eq!(sync(&c, &b), Action::Nothing);

    // Progress on the winning side flows on cleanly.
    a.update(A, 6);
    assert_eq!(sync(&a, &b), Action::Copy);

    a.validate();
    b.validate();
    c.validate();
}

/// Three replicas, conflict resolved by keeping the local side.
#[test]
fn conflict_resolved_local_still_conflicts_with_later_rival_edit() {
    let mut a = Clock::default();
    let mut b = Clock::default();
    let mut c = Clock::default();

    b.update(B, 1);
    assert_eq!(sync(&b, &a), Action::Copy);
    a.resolve_theirs(&b);
    assert_eq!(sync(&b, &c), Action::Copy);
    c.resolve_theirs(&b);

    a.update(A, 3);
    b.update(B, 3);
    assert_eq!(sync(&a, &b), Action::Conflict);
    b.resolve_ours(&a);

    // The rival state it just saw no longer registers.
    assert_eq!(sync(&a, &b), Action::Nothing);
    assert_eq!(sync(&c, &b), Action::Nothing);

    // But the loser editing onward is a genuinely new divergence.
    a.update(A, 6);
    assert_eq!(sync(&a, &b), Action::Conflict);

    a.validate();
    b.validate();
    c.validate();
}

/// Three replicas, conflict resolved by writing merged content.
#[test]
fn conflict_resolved_as_new_version_is_a_new_causal_future() {
    let mut a = Clock::default();
    let mut b = Clock::default();
    let mut c = Clock::default();

    b.update(B, 1);
    assert_eq!(sync(&b, &a), Action::Copy);
    a.resolve_theirs(&b);
    assert_eq!(sync(&b, &c), Action::Copy);
    c.resolve_theirs(&b);

    a.update(A, 3);
    b.update(B, 3);
    assert_eq!(sync(&a, &b), Action::Conflict);
    b.resolve_new(&a);

    assert_eq!(sync(&a, &b), Action::Nothing);
    assert_eq!(sync(&c, &b), Action::Nothing);

    a.update(A, 6);
    assert_eq!(sync(&a, &b), Action::Conflict);

    a.validate();
    b.validate();
    c.validate();
}

#[test]
fn tombstone_superseded_by_independent_create() {
    let mut a = Clock::create(A, 1);
    a.update(A, 2); // delete

    // The deletion propagates like any modification.
    let mut b = Clock::default();
    assert_eq!(sync(&a, &b), Action::Copy);
    b.resolve_theirs(&a);

    // The same name is recreated elsewhere with a fresh identity; the
    // tombstone holder adopts it rather than reporting a conflict.
    let b = Clock::create(B, 4);
    assert_eq!(sync_to_missing(&b, &a), Action::Copy);
    a.resolve_theirs(&b);
    assert_eq!(a.create_stamp(), b.create_stamp());

    a.validate();
    b.validate();
}

#[test]
fn unsynced_tombstone_superseded_by_independent_create() {
    let mut a = Clock::create(A, 1);
    a.update(A, 2); // delete, never propagated

    let b = Clock::create(B, 4);
    assert_eq!(sync_to_missing(&b, &a), Action::Copy);
    a.resolve_theirs(&b);

    a.validate();
    b.validate();
}

#[test]
fn simultaneous_independent_deletions_converge() {
    let mut a = Clock::create(A, 1);
    let mut b = Clock::create(B, 1);

    a.update(A, 2); // delete
    b.update(B, 2); // delete

    assert_eq!(sync_to_missing(&b, &a), Action::Copy);
    a.resolve_theirs(&b);

    a.validate();
    b.validate();
}

#[test]
fn monotonicity_over_an_operation_sequence() {
    let mut a = Clock::create(A, 1);
    let mut peer = Clock::create(A, 1);
    peer.update(B, 2);

    let mut floor_a = 0;
    let mut floor_b = 0;
    let mut check = |c: &Clock| {
        assert!(c.mod_vector().get(A) >= floor_a);
        assert!(c.sync_vector().get(A) >= floor_a);
        assert!(c.sync_vector().get(B) >= floor_b);
        floor_a = c.mod_vector().get(A);
        floor_b = c.sync_vector().get(B);
    };

    check(&a);
    a.update(A, 4);
    check(&a);
    a.resolve_ours(&peer);
    check(&a);
    a.update(A, 7);
    check(&a);
    a.resolve_new(&peer);
    check(&a);
    a.validate();
}

#[test]
fn textual_form_round_trips_through_exchange() {
    let mut a = Clock::create(A, 1);
    let mut b = Clock::default();
    b.resolve_theirs(&a);
    b.update(B, 5);
    a.resolve_ours(&b);

    for clock in [&a, &b] {
        let reparsed: Clock = clock.to_string().parse().unwrap();
        assert_eq!(&reparsed, clock);
    }
}
