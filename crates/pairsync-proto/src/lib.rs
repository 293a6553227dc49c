//! # pairsync Protocol
//!
//! Wire message types exchanged between replicas during synchronization.
//!
//! The transport itself lives outside this workspace; this crate stops at
//! CBOR bytes. Messages:
//!
//! - `PeerHello`: peer identification at session start
//! - `ObjectState`: one object's clock and tombstone marker as held by the
//!   sending replica
//! - `StateBatch`: a set of object states for anti-entropy sweeps

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;

pub use messages::{MessageError, ObjectState, PeerHello, StateBatch};
