//! The read-decide-mutate-persist reconciliation path.
//!
//! Every operation here runs in one `SQLite` transaction: the decision is
//! made against the same clock value the resolver then mutates, and the
//! result lands atomically. Interleaving two decisions against a
//! half-updated clock would break the monotonicity invariants, so callers
//! get no smaller pieces to compose.

use crate::store::{
    clear_conflicts, load_object, note_conflict, save_object, tick, MetaStore, ObjectRecord,
    StoreError,
};
use pairsync_core::{sync, sync_to_missing, Action, Clock};
use pairsync_proto::{ObjectState, PeerHello, StateBatch};

/// What reconciliation did with a remote state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The remote version superseded ours; its clock was adopted.
    Copied,
    /// The remote carried nothing new; at most our knowledge horizon moved.
    Unchanged,
    /// Both sides hold unseen modifications; a conflict was recorded and the
    /// local object left untouched.
    Conflicted,
}

/// The caller's decision for a recorded conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the local version, remembering the rival so it is not reported
    /// again.
    Ours,
    /// Adopt the remote version wholesale, tombstone marker included.
    Theirs,
    /// The caller wrote merged content superseding both; absorb both
    /// histories and stamp the merge as a fresh local modification.
    New,
}

impl MetaStore {
    /// Record a local write (create or modify) at `path`.
    ///
    /// A write over a tombstoned or unknown path starts a brand-new object
    /// identity; the delete-then-recreate race is later detected through the
    /// creation stamp, not the path.
    ///
    /// # Errors
    ///
    /// Returns error on storage failure.
    pub fn record_write(&mut self, path: &str) -> Result<Clock, StoreError> {
        let tx = self.conn.transaction()?;
        let epoch = tick(&tx)?;
        let record = match load_object(&tx, path)? {
            Some(mut record) if !record.tombstone => {
                record.clock.update(self.self_id, epoch);
                record
            }
            _ => ObjectRecord {
                clock: Clock::create(self.self_id, epoch),
                tombstone: false,
            },
        };
        record.clock.validate();
        save_object(&tx, path, &record)?;
        tx.commit()?;

        tracing::debug!(path, clock = %record.clock, "recorded local write");
        Ok(record.clock)
    }

    /// Record a local deletion of the live object at `path`.
    ///
    /// Deletion is an ordinary clock modification; the record stays behind
    /// as a tombstone so later syncs can tell "deleted" from "never seen".
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownObject`] for an unknown path and
    /// [`StoreError::NotLive`] for an already-deleted one.
    pub fn record_delete(&mut self, path: &str) -> Result<Clock, StoreError> {
        let tx = self.conn.transaction()?;
        let Some(mut record) = load_object(&tx, path)? else {
            return Err(StoreError::UnknownObject(path.to_string()));
        };
        if record.tombstone {
            return Err(StoreError::NotLive(path.to_string()));
        }
        let epoch = tick(&tx)?;
        record.clock.update(self.self_id, epoch);
        record.tombstone = true;
        record.clock.validate();
        save_object(&tx, path, &record)?;
        tx.commit()?;

        tracing::debug!(path, clock = %record.clock, "recorded local delete");
        Ok(record.clock)
    }

    /// Reconcile a peer's state for one object against our own.
    ///
    /// Chooses the live-destination or missing-destination comparison as
    /// appropriate, applies the matching merge for `Copy` and `Nothing`, and
    /// records `Conflict` without touching the local object; resolving it is
    /// a separate, explicitly chosen step ([`MetaStore::resolve_conflict`]).
    ///
    /// # Errors
    ///
    /// Returns error on storage failure.
    pub fn reconcile(&mut self, remote: &ObjectState) -> Result<Outcome, StoreError> {
        let tx = self.conn.transaction()?;
        let local = load_object(&tx, &remote.path)?;
        let (local_clock, local_live) = match &local {
            Some(record) => (record.clock.clone(), !record.tombstone),
            None => (Clock::default(), false),
        };

        let action = if local_live {
            sync(&remote.clock, &local_clock)
        } else {
            sync_to_missing(&remote.clock, &local_clock)
        };

        let outcome = match action {
            Action::Copy => {
                let mut clock = local_clock;
                clock.resolve_theirs(&remote.clock);
                clock.validate();
                save_object(
                    &tx,
                    &remote.path,
                    &ObjectRecord {
                        clock,
                        tombstone: remote.tombstone,
                    },
                )?;
                Outcome::Copied
            }
            Action::Nothing => {
                // Remember having seen this state; with no local record at
                // all there is nothing to remember it against.
                if let Some(mut record) = local {
                    record.clock.resolve_ours(&remote.clock);
                    record.clock.validate();
                    save_object(&tx, &remote.path, &record)?;
                }
                Outcome::Unchanged
            }
            Action::Conflict => {
                note_conflict(&tx, &remote.path, &local_clock, &remote.clock)?;
                Outcome::Conflicted
            }
        };
        tx.commit()?;

        tracing::debug!(path = %remote.path, %action, ?outcome, "reconciled remote state");
        Ok(outcome)
    }

    /// Apply the caller's resolution for a conflict at `remote.path`, then
    /// clear the recorded conflicts for that path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownObject`] if the path has no record.
    pub fn resolve_conflict(
        &mut self,
        remote: &ObjectState,
        resolution: Resolution,
    ) -> Result<Clock, StoreError> {
        let tx = self.conn.transaction()?;
        let Some(mut record) = load_object(&tx, &remote.path)? else {
            return Err(StoreError::UnknownObject(remote.path.clone()));
        };

        match resolution {
            Resolution::Ours => {
                record.clock.resolve_ours(&remote.clock);
            }
            Resolution::Theirs => {
                record.clock.resolve_theirs(&remote.clock);
                record.tombstone = remote.tombstone;
            }
            Resolution::New => {
                record.clock.resolve_new(&remote.clock);
                let epoch = tick(&tx)?;
                record.clock.update(self.self_id, epoch);
                record.tombstone = false;
            }
        }
        record.clock.validate();
        save_object(&tx, &remote.path, &record)?;
        let cleared = clear_conflicts(&tx, &remote.path)?;
        tx.commit()?;

        tracing::info!(
            path = %remote.path,
            ?resolution,
            cleared,
            clock = %record.clock,
            "resolved conflict"
        );
        Ok(record.clock)
    }

    /// The state to hand a transport for one object, if any is recorded.
    ///
    /// # Errors
    ///
    /// Returns error on storage failure.
    pub fn export_state(&self, path: &str) -> Result<Option<ObjectState>, StoreError> {
        let record = load_object(&self.conn, path)?;
        Ok(record.map(|record| ObjectState {
            path: path.to_string(),
            clock: record.clock,
            tombstone: record.tombstone,
        }))
    }

    /// Every recorded object's state, for an anti-entropy sweep.
    ///
    /// # Errors
    ///
    /// Returns error on storage failure.
    pub fn export_all(&self) -> Result<StateBatch, StoreError> {
        let states = self
            .list_objects()?
            .into_iter()
            .map(|(path, record)| ObjectState {
                path,
                clock: record.clock,
                tombstone: record.tombstone,
            })
            .collect();
        Ok(StateBatch { states })
    }

    /// The hello message identifying this replica to a peer.
    #[must_use]
    pub fn hello(&self) -> PeerHello {
        PeerHello::new(self.self_uuid, self.self_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairsync_core::ReplicaId;

    #[test]
    fn writes_create_then_update() {
        let mut store = MetaStore::in_memory(ReplicaId(10)).unwrap();

        let first = store.record_write("notes.txt").unwrap();
        assert_eq!(first.to_string(), "{sync{10:1} mod{10:1} create{10:1}}");

        let second = store.record_write("notes.txt").unwrap();
        assert_eq!(second.to_string(), "{sync{10:2} mod{10:2} create{10:1}}");
    }

    #[test]
    fn delete_requires_a_live_object() {
        let mut store = MetaStore::in_memory(ReplicaId(10)).unwrap();
        assert!(matches!(
            store.record_delete("ghost"),
            Err(StoreError::UnknownObject(_))
        ));

        store.record_write("doc.md").unwrap();
        let tomb = store.record_delete("doc.md").unwrap();
        assert_eq!(tomb.to_string(), "{sync{10:2} mod{10:2} create{10:1}}");
        assert!(store.get("doc.md").unwrap().unwrap().tombstone);

        assert!(matches!(
            store.record_delete("doc.md"),
            Err(StoreError::NotLive(_))
        ));
    }

    #[test]
    fn recreate_after_delete_starts_a_new_identity() {
        let mut store = MetaStore::in_memory(ReplicaId(10)).unwrap();
        store.record_write("doc.md").unwrap();
        store.record_delete("doc.md").unwrap();

        let reborn = store.record_write("doc.md").unwrap();
        assert_eq!(reborn.to_string(), "{sync{10:3} mod{10:3} create{10:3}}");
        assert!(!store.get("doc.md").unwrap().unwrap().tombstone);
    }

    #[test]
    fn export_reflects_the_stored_record() {
        let mut store = MetaStore::in_memory(ReplicaId(10)).unwrap();
        assert!(store.export_state("nope").unwrap().is_none());

        store.record_write("a.txt").unwrap();
        store.record_write("b.txt").unwrap();
        store.record_delete("b.txt").unwrap();

        let state = store.export_state("b.txt").unwrap().unwrap();
        assert!(state.tombstone);

        let batch = store.export_all().unwrap();
        assert_eq!(batch.states.len(), 2);
    }
}
