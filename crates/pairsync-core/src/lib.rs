//! # pairsync Core
//!
//! Causality tracking and conflict detection for a peer-to-peer,
//! replica-based file synchronization store.
//!
//! Every filesystem object carries a small piece of per-replica metadata, a
//! vector-pair [`Clock`], that lets any two replicas decide pairwise and
//! without a coordinator whether one side's version should overwrite the
//! other, whether nothing needs to happen, or whether the versions have
//! diverged and need reconciliation.
//!
//! This crate provides:
//! - The [`Clock`] value type: `sync` and `mod` version vectors plus a
//!   creation stamp, with a deterministic textual form
//! - The three-outcome comparison ([`sync`], [`sync_to_missing`])
//! - The merge operations applied after a decision
//!   ([`Clock::resolve_theirs`], [`Clock::resolve_ours`],
//!   [`Clock::resolve_new`])
//! - A defensive invariant checker ([`Clock::validate`])
//!
//! All operations are pure value-level code: no I/O, no threads, no shared
//! state. Where a replica is expected to supply monotonically increasing
//! time and fails to, that is a programmer error and the crate panics rather
//! than silently repairing the clock.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod vector;

pub use clock::{sync, sync_to_missing, Action, Clock, ParseClockError, Stamp};
pub use vector::{Epoch, ReplicaId, VersionVector};
