//! Vector-pair clocks and the reconciliation decision.
//!
//! A [`Clock`] is attached to one filesystem object at one replica. It holds
//! two version vectors and a creation stamp:
//!
//! - `mod` records, per replica, the last modification time this replica
//!   knows that replica made to the object
//! - `sync` records, per replica, the highest modification time this replica
//!   has *knowledge of*, whether by modifying or by syncing from someone who
//!   knew it
//! - `create` is the identity of the object: who created it and when, set
//!   once and never altered
//!
//! Comparing `source.mod` against `dest.sync` (and the reverse) yields the
//! three-outcome decision of [`sync`]: the destination should adopt the
//! source, do nothing, or flag a conflict. Keeping modification and sync
//! knowledge separate is what lets the scheme distinguish "causally behind"
//! from "diverged"; collapsing the pair into a single vector comparison
//! loses that distinction.

use crate::vector::{Epoch, ReplicaId, VersionVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The identity stamp of an object: which replica created it, and when.
///
/// Two clocks with differing stamps describe causally unrelated objects that
/// merely occupy the same name, e.g. after a delete-then-recreate race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    /// The creating replica.
    pub id: ReplicaId,
    /// The creating replica's logical time at creation.
    pub epoch: Epoch,
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.epoch)
    }
}

/// What the destination replica should do about the source's version.
///
/// The decision is directional: it answers "what should `dest` do about
/// `source`", not which version is globally newer. Swapping the arguments of
/// [`sync`] can legitimately change the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The source holds state the destination has never seen, and the
    /// destination holds nothing of its own; adopt the source wholesale.
    Copy,
    /// The source carries nothing the destination lacks.
    Nothing,
    /// Both sides hold modifications unknown to the other; a policy or a
    /// user has to pick.
    Conflict,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Copy => "copy",
            Action::Nothing => "nothing",
            Action::Conflict => "conflict",
        };
        f.write_str(name)
    }
}

/// Per-object, per-replica synchronization metadata.
///
/// The zero value ([`Clock::default`]) is valid and means "no object here";
/// it is what a replica compares against for a name it has never seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    sync: VersionVector,
    #[serde(rename = "mod")]
    modified: VersionVector,
    create: Option<Stamp>,
}

impl Clock {
    /// A clock for a brand-new object created by `id` at `now`.
    ///
    /// The creation event is the object's first modification, so all three
    /// fields carry the same stamp.
    #[must_use]
    pub fn create(id: ReplicaId, now: Epoch) -> Self {
        let mut v = VersionVector::new();
        v.record(id, now);
        Self {
            sync: v.clone(),
            modified: v,
            create: Some(Stamp { id, epoch: now }),
        }
    }

    /// Record that `id` modified the object at `now`.
    ///
    /// Deletion counts as a modification like any other; the tombstone
    /// marker lives with the collaborator that owns object content, not
    /// here. A replica fully knows its own modifications, so both vectors
    /// advance together.
    ///
    /// # Panics
    ///
    /// Panics if `now` is not strictly greater than the clock's current
    /// entries for `id`. The caller owns the monotonic time source; going
    /// backwards is a bug that must not be papered over.
    pub fn update(&mut self, id: ReplicaId, now: Epoch) {
        let seen = self.sync.get(id).max(self.modified.get(id));
        assert!(
            now > seen,
            "non-monotonic update for replica {id}: {now} <= {seen}"
        );
        self.modified.record(id, now);
        self.sync.record(id, now);
    }

    /// Adopt `other` wholesale: modification history, sync knowledge, and
    /// identity.
    ///
    /// Applies a [`Action::Copy`] decision, or a [`Action::Conflict`]
    /// resolved in favor of the remote side. Whatever this replica knew
    /// about the losing version is deliberately discarded with it.
    pub fn resolve_theirs(&mut self, other: &Self) {
        self.sync = other.sync.clone();
        self.modified = other.modified.clone();
        self.create = other.create;
    }

    /// Keep our version, but remember having seen `other`.
    ///
    /// Folds the other side's knowledge into `sync` so the same rival state
    /// is not reported again; `mod` and `create` are untouched because our
    /// content did not change. Applies a [`Action::Nothing`] decision, or a
    /// [`Action::Conflict`] resolved in favor of the local side.
    pub fn resolve_ours(&mut self, other: &Self) {
        self.sync.merge(&other.sync);
        self.sync.merge(&other.modified);
    }

    /// Absorb both histories in favor of newly created merged content.
    ///
    /// `sync` comes to dominate everything either input knew, but `mod`
    /// stays as-is: the merged version is a different causal future, and the
    /// caller writing it is responsible for stamping its own modification.
    /// Replicas that have not seen the merge will still flag a conflict
    /// against it, which is correct.
    pub fn resolve_new(&mut self, other: &Self) {
        self.sync.merge(&other.sync);
        self.sync.merge(&other.modified);
    }

    /// The sync-knowledge vector.
    #[must_use]
    pub fn sync_vector(&self) -> &VersionVector {
        &self.sync
    }

    /// The modification vector.
    #[must_use]
    pub fn mod_vector(&self) -> &VersionVector {
        &self.modified
    }

    /// The creation stamp, if the object's origin is known.
    #[must_use]
    pub fn create_stamp(&self) -> Option<Stamp> {
        self.create
    }

    /// `true` for the zero value, meaning "no object here".
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.sync.is_empty() && self.modified.is_empty() && self.create.is_none()
    }

    /// Check the structural invariants of the vector pair.
    ///
    /// Intended as a defensive assertion after every mutation, in tests and
    /// in production self-checks alike. Not an input validator: a violation
    /// means a bug in this crate or its caller, never bad external data.
    ///
    /// # Panics
    ///
    /// Panics if any `mod` entry exceeds its `sync` entry, or if the
    /// creation stamp is not covered by both vectors at the creator's entry.
    pub fn validate(&self) {
        for (id, epoch) in self.modified.iter() {
            let synced = self.sync.get(id);
            assert!(
                synced >= epoch,
                "clock {self}: sync[{id}]={synced} behind mod[{id}]={epoch}"
            );
        }
        if let Some(stamp) = self.create {
            assert!(
                self.modified.get(stamp.id) >= stamp.epoch,
                "clock {self}: creation {stamp} not covered by mod"
            );
            assert!(
                self.sync.get(stamp.id) >= stamp.epoch,
                "clock {self}: creation {stamp} not covered by sync"
            );
        }
    }
}

/// Decide what the destination should do about the source's version.
///
/// `from` and `to` describe the same logical object as held at two replicas.
/// Neither clock is mutated; the caller applies the matching resolver
/// afterwards. Evaluation order matters: a source with nothing new yields
/// [`Action::Nothing`] regardless of the destination's own novelty.
#[must_use]
pub fn sync(from: &Clock, to: &Clock) -> Action {
    let action = if !from.modified.any_greater(&to.sync) {
        // Destination has already seen every modification the source knows.
        Action::Nothing
    } else if to.modified.any_greater(&from.sync) {
        // Novelty on both sides.
        Action::Conflict
    } else {
        Action::Copy
    };
    tracing::trace!(%from, %to, %action, "sync decision");
    action
}

/// Decide as [`sync`], for a destination with no live object under the name.
///
/// `to` is the destination's historical clock: a tombstone from a prior
/// deletion, or the zero value for a name never seen. With matching `create`
/// identities the general rule applies unchanged. When the identities
/// differ, the two clocks describe unrelated objects, and since the
/// destination has no live content to protect, a would-be conflict degrades
/// to adopting the source. A `Nothing` outcome is never manufactured from
/// the identity mismatch alone: it can only arise from the general rule,
/// i.e. when the destination's tombstone causally dominates the source.
#[must_use]
pub fn sync_to_missing(from: &Clock, to: &Clock) -> Action {
    let mut action = sync(from, to);
    if action == Action::Conflict && from.create != to.create {
        tracing::trace!(%from, %to, "unrelated identities, superseding tombstone");
        action = Action::Copy;
    }
    action
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{sync{} mod{} create{{", self.sync, self.modified)?;
        if let Some(stamp) = self.create {
            write!(f, "{stamp}")?;
        }
        write!(f, "}}}}")
    }
}

/// Failure to parse the textual clock form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseClockError {
    /// The literal does not have the `{sync{..} mod{..} create{..}}` shape.
    #[error("malformed clock literal: {0}")]
    Malformed(&'static str),
    /// A vector entry is not of the form `replica:epoch`.
    #[error("invalid vector entry {0:?}")]
    Entry(String),
    /// The create field holds more than one entry.
    #[error("create holds more than one entry")]
    MultipleCreate,
}

impl FromStr for Clock {
    type Err = ParseClockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .ok_or(ParseClockError::Malformed("missing outer braces"))?;

        let rest = inner
            .strip_prefix("sync")
            .ok_or(ParseClockError::Malformed("expected sync field"))?;
        let (sync_body, rest) = take_braced(rest)?;
        let rest = rest
            .strip_prefix(" mod")
            .ok_or(ParseClockError::Malformed("expected mod field"))?;
        let (mod_body, rest) = take_braced(rest)?;
        let rest = rest
            .strip_prefix(" create")
            .ok_or(ParseClockError::Malformed("expected create field"))?;
        let (create_body, rest) = take_braced(rest)?;
        if !rest.is_empty() {
            return Err(ParseClockError::Malformed("trailing input"));
        }

        let create = {
            let mut stamps = create_body
                .split_whitespace()
                .map(parse_entry)
                .collect::<Result<Vec<_>, _>>()?;
            if stamps.len() > 1 {
                return Err(ParseClockError::MultipleCreate);
            }
            stamps.pop().map(|(id, epoch)| Stamp { id, epoch })
        };

        Ok(Self {
            sync: parse_entries(sync_body)?,
            modified: parse_entries(mod_body)?,
            create,
        })
    }
}

fn take_braced(s: &str) -> Result<(&str, &str), ParseClockError> {
    let s = s
        .strip_prefix('{')
        .ok_or(ParseClockError::Malformed("expected '{'"))?;
    let end = s
        .find('}')
        .ok_or(ParseClockError::Malformed("unterminated '{'"))?;
    Ok((&s[..end], &s[end + 1..]))
}

fn parse_entries(body: &str) -> Result<VersionVector, ParseClockError> {
    let mut v = VersionVector::new();
    for part in body.split_whitespace() {
        let (id, epoch) = parse_entry(part)?;
        v.record(id, epoch);
    }
    Ok(v)
}

fn parse_entry(part: &str) -> Result<(ReplicaId, Epoch), ParseClockError> {
    let err = || ParseClockError::Entry(part.to_string());
    let (id, epoch) = part.split_once(':').ok_or_else(err)?;
    let id = id.parse::<u32>().map_err(|_| err())?;
    let epoch = epoch.parse::<Epoch>().map_err(|_| err())?;
    Ok((ReplicaId(id), epoch))
}
