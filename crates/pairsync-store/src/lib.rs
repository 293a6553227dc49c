//! Replica-local object metadata store.
//!
//! This crate is the collaborator that sits between the clock algorithm and
//! the rest of a replica: it persists one clock per filesystem object in
//! SQLite, supplies the replica's strictly monotonic modification counter,
//! and runs the read-decide-mutate-persist reconciliation sequence inside a
//! single transaction so concurrent local operations can never observe a
//! half-updated clock.
//!
//! It deliberately knows nothing about file content or transports; it
//! consumes [`pairsync_proto::ObjectState`] values handed in by whatever
//! moves bytes between replicas, and records conflicts without deciding
//! what to do about them.

#![warn(clippy::all)]

pub mod config;
pub mod session;
pub mod store;

pub use config::StoreConfig;
pub use session::{Outcome, Resolution};
pub use store::{ConflictRecord, MetaStore, ObjectRecord, StoreError};
