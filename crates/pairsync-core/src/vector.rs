//! Version vectors: per-replica logical time maps.
//!
//! A [`VersionVector`] maps replica identifiers to the highest logical time
//! known for that replica. An absent entry is equivalent to time zero. Time
//! values are only comparable within a single replica's entries; across
//! replicas the vector as a whole carries the causal information.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Compact, totally ordered identifier for a replica.
///
/// Assigned by the deployment, globally unique and stable for its lifetime.
/// The clock algorithm never invents or compares these beyond equality and
/// ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ReplicaId(pub u32);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-replica logical modification time.
///
/// Monotonically non-decreasing within a replica; never compared across
/// replicas directly.
pub type Epoch = u64;

/// A mapping from replica to the highest epoch known for it.
///
/// Entries are kept sorted by replica id so iteration and the textual form
/// are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<ReplicaId, Epoch>,
}

impl VersionVector {
    /// Create an empty vector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the epoch recorded for `id`, zero if absent.
    #[must_use]
    pub fn get(&self, id: ReplicaId) -> Epoch {
        self.entries.get(&id).copied().unwrap_or(0)
    }

    /// Record `epoch` for `id`, keeping the higher of the two values.
    pub fn record(&mut self, id: ReplicaId, epoch: Epoch) {
        let entry = self.entries.entry(id).or_insert(0);
        *entry = (*entry).max(epoch);
    }

    /// Point-wise maximum with `other`.
    pub fn merge(&mut self, other: &Self) {
        for (&id, &epoch) in &other.entries {
            self.record(id, epoch);
        }
    }

    /// Existential dominance: `true` if some replica's entry here exceeds
    /// the corresponding entry in `other` (absent entries count as zero).
    #[must_use]
    pub fn any_greater(&self, other: &Self) -> bool {
        self.entries
            .iter()
            .any(|(&id, &epoch)| epoch > other.get(id))
    }

    /// Iterate entries in replica-id order.
    pub fn iter(&self) -> impl Iterator<Item = (ReplicaId, Epoch)> + '_ {
        self.entries.iter().map(|(&id, &epoch)| (id, epoch))
    }

    /// Number of replicas with a recorded entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no replica has a recorded entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (id, epoch)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{id}:{epoch}")?;
        }
        write!(f, "}}")
    }
}
