//! `SQLite` persistence for object clocks and replica bookkeeping.

use chrono::{DateTime, Utc};
use pairsync_core::{Clock, Epoch, ReplicaId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

/// One object's persisted metadata: its clock and whether the object is
/// currently held as deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    /// The clock for the object as held at this replica.
    pub clock: Clock,
    /// `true` if the object is a tombstone.
    pub tombstone: bool,
}

/// A recorded conflict awaiting a policy or user decision.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    /// The object path the conflict was observed on.
    pub path: String,
    /// Our clock at the time the conflict was noted.
    pub ours: Clock,
    /// The rival clock offered by the peer.
    pub theirs: Clock,
    /// When the conflict was noted.
    pub noted_at: DateTime<Utc>,
}

/// Errors from the metadata store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A clock could not be encoded for storage or the wire.
    #[error("clock encoding failed: {0}")]
    Encode(String),
    /// A stored value could not be decoded.
    #[error("stored value is corrupt: {0}")]
    Decode(String),
    /// The path has no record at all.
    #[error("unknown object: {0}")]
    UnknownObject(String),
    /// The path exists but holds no live object.
    #[error("no live object at {0}")]
    NotLive(String),
    /// A replica id is already bound to a different peer identity.
    #[error("replica {0} already registered with a different identity")]
    ReplicaMismatch(ReplicaId),
}

/// `SQLite`-backed store for object clocks, the local modification counter,
/// and the replica registry.
pub struct MetaStore {
    pub(crate) conn: Connection,
    pub(crate) self_id: ReplicaId,
    pub(crate) self_uuid: Uuid,
}

impl MetaStore {
    /// Open or create a store at `path` for the replica with the
    /// deployment-assigned id `self_id`.
    ///
    /// A fresh store mints a random peer identity and persists it; reopening
    /// reuses the stored one.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or initialized.
    pub fn open(path: &Path, self_id: ReplicaId) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, self_id, None)
    }

    /// Open as [`MetaStore::open`], but with an explicit peer identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReplicaMismatch`] if the store already holds a
    /// different identity for `self_id`.
    pub fn open_as(path: &Path, self_id: ReplicaId, uuid: Uuid) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn, self_id, Some(uuid))
    }

    /// Create an in-memory store (for testing and demos).
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be created.
    pub fn in_memory(self_id: ReplicaId) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, self_id, None)
    }

    fn with_connection(
        conn: Connection,
        self_id: ReplicaId,
        uuid: Option<Uuid>,
    ) -> Result<Self, StoreError> {
        init_schema(&conn)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT uuid FROM replicas WHERE replica_id = ?1",
                [self_id.0],
                |row| row.get(0),
            )
            .optional()?;

        let self_uuid = match stored {
            Some(raw) => {
                let stored = parse_uuid(&raw)?;
                if let Some(wanted) = uuid {
                    if wanted != stored {
                        return Err(StoreError::ReplicaMismatch(self_id));
                    }
                }
                stored
            }
            None => {
                let minted = uuid.unwrap_or_else(Uuid::new_v4);
                conn.execute(
                    "INSERT INTO replicas (replica_id, uuid, added_at) VALUES (?1, ?2, ?3)",
                    params![self_id.0, minted.to_string(), now_ts()],
                )?;
                minted
            }
        };

        Ok(Self {
            conn,
            self_id,
            self_uuid,
        })
    }

    /// The deployment-assigned id this store stamps into clocks.
    #[must_use]
    pub fn self_id(&self) -> ReplicaId {
        self.self_id
    }

    /// The stable peer identity of this replica.
    #[must_use]
    pub fn self_uuid(&self) -> Uuid {
        self.self_uuid
    }

    /// Bind a peer's compact replica id to its stable identity.
    ///
    /// Idempotent for a matching pair; ids are assigned by the deployment
    /// and never reused, so a clash is refused rather than overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReplicaMismatch`] on a clashing registration.
    pub fn register_replica(&self, id: ReplicaId, uuid: Uuid) -> Result<(), StoreError> {
        if let Some(existing) = self.replica_uuid(id)? {
            if existing != uuid {
                return Err(StoreError::ReplicaMismatch(id));
            }
            return Ok(());
        }
        self.conn.execute(
            "INSERT INTO replicas (replica_id, uuid, added_at) VALUES (?1, ?2, ?3)",
            params![id.0, uuid.to_string(), now_ts()],
        )?;
        tracing::debug!(replica = %id, %uuid, "registered replica");
        Ok(())
    }

    /// Look up the peer identity bound to `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or the stored value is corrupt.
    pub fn replica_uuid(&self, id: ReplicaId) -> Result<Option<Uuid>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT uuid FROM replicas WHERE replica_id = ?1",
                [id.0],
                |row| row.get(0),
            )
            .optional()?;
        raw.as_deref().map(parse_uuid).transpose()
    }

    /// Fetch one object's record.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or the stored clock is corrupt.
    pub fn get(&self, path: &str) -> Result<Option<ObjectRecord>, StoreError> {
        load_object(&self.conn, path)
    }

    /// All object records, ordered by path.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or a stored clock is corrupt.
    pub fn list_objects(&self) -> Result<Vec<(String, ObjectRecord)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, clock, tombstone FROM objects ORDER BY path")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, bool>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (path, blob, tombstone) = row?;
            out.push((
                path,
                ObjectRecord {
                    clock: decode_clock(&blob)?,
                    tombstone,
                },
            ));
        }
        Ok(out)
    }

    /// All recorded conflicts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails or a stored clock is corrupt.
    pub fn list_conflicts(&self) -> Result<Vec<ConflictRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, ours, theirs, noted_at FROM conflicts ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (path, ours, theirs, noted_at) = row?;
            out.push(ConflictRecord {
                path,
                ours: decode_clock(&ours)?,
                theirs: decode_clock(&theirs)?,
                noted_at: DateTime::from_timestamp(noted_at, 0).unwrap_or(DateTime::UNIX_EPOCH),
            });
        }
        Ok(out)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r"
        -- Deployment-assigned replica ids and the peer identities behind them
        CREATE TABLE IF NOT EXISTS replicas (
            replica_id INTEGER PRIMARY KEY,
            uuid TEXT NOT NULL UNIQUE,
            added_at INTEGER NOT NULL
        );

        -- This replica's strictly monotonic modification counter
        CREATE TABLE IF NOT EXISTS local_counter (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            last_epoch INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO local_counter (id, last_epoch) VALUES (0, 0);

        -- One row per filesystem object; clock is a CBOR blob
        CREATE TABLE IF NOT EXISTS objects (
            path TEXT PRIMARY KEY,
            clock BLOB NOT NULL,
            tombstone INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL
        );

        -- Conflicts noted during reconciliation, pending a decision
        CREATE TABLE IF NOT EXISTS conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL,
            ours BLOB NOT NULL,
            theirs BLOB NOT NULL,
            noted_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_conflicts_path ON conflicts(path);
        ",
    )?;
    Ok(())
}

/// Advance and return the local modification counter.
///
/// Runs inside the caller's transaction, so a crash between the tick and the
/// clock write cannot leak an epoch into reuse.
pub(crate) fn tick(conn: &Connection) -> Result<Epoch, StoreError> {
    conn.execute(
        "UPDATE local_counter SET last_epoch = last_epoch + 1 WHERE id = 0",
        [],
    )?;
    let epoch: i64 = conn.query_row(
        "SELECT last_epoch FROM local_counter WHERE id = 0",
        [],
        |row| row.get(0),
    )?;
    to_epoch(epoch)
}

pub(crate) fn load_object(
    conn: &Connection,
    path: &str,
) -> Result<Option<ObjectRecord>, StoreError> {
    let row: Option<(Vec<u8>, bool)> = conn
        .query_row(
            "SELECT clock, tombstone FROM objects WHERE path = ?1",
            [path],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    row.map(|(blob, tombstone)| {
        Ok(ObjectRecord {
            clock: decode_clock(&blob)?,
            tombstone,
        })
    })
    .transpose()
}

pub(crate) fn save_object(
    conn: &Connection,
    path: &str,
    record: &ObjectRecord,
) -> Result<(), StoreError> {
    conn.execute(
        r"
        INSERT OR REPLACE INTO objects (path, clock, tombstone, updated_at)
        VALUES (?1, ?2, ?3, ?4)
        ",
        params![path, encode_clock(&record.clock)?, record.tombstone, now_ts()],
    )?;
    Ok(())
}

pub(crate) fn note_conflict(
    conn: &Connection,
    path: &str,
    ours: &Clock,
    theirs: &Clock,
) -> Result<(), StoreError> {
    conn.execute(
        r"
        INSERT INTO conflicts (path, ours, theirs, noted_at)
        VALUES (?1, ?2, ?3, ?4)
        ",
        params![path, encode_clock(ours)?, encode_clock(theirs)?, now_ts()],
    )?;
    Ok(())
}

pub(crate) fn clear_conflicts(conn: &Connection, path: &str) -> Result<usize, StoreError> {
    let cleared = conn.execute("DELETE FROM conflicts WHERE path = ?1", [path])?;
    Ok(cleared)
}

pub(crate) fn encode_clock(clock: &Clock) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(clock, &mut bytes).map_err(|e| StoreError::Encode(e.to_string()))?;
    Ok(bytes)
}

pub(crate) fn decode_clock(bytes: &[u8]) -> Result<Clock, StoreError> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Decode(format!("replica uuid: {e}")))
}

fn to_epoch(value: i64) -> Result<Epoch, StoreError> {
    Epoch::try_from(value).map_err(|_| StoreError::Decode(format!("counter value {value}")))
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_minted_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("meta.db");

        let first = MetaStore::open(&db, ReplicaId(10)).unwrap();
        let minted = first.self_uuid();
        drop(first);

        let reopened = MetaStore::open(&db, ReplicaId(10)).unwrap();
        assert_eq!(reopened.self_uuid(), minted);

        // An explicit, different identity for the same id is refused.
        let clash = MetaStore::open_as(&db, ReplicaId(10), Uuid::new_v4());
        assert!(matches!(clash, Err(StoreError::ReplicaMismatch(_))));
    }

    #[test]
    fn replica_registry_is_idempotent_but_refuses_clashes() {
        let store = MetaStore::in_memory(ReplicaId(10)).unwrap();
        let peer = Uuid::new_v4();

        store.register_replica(ReplicaId(11), peer).unwrap();
        store.register_replica(ReplicaId(11), peer).unwrap();
        assert_eq!(store.replica_uuid(ReplicaId(11)).unwrap(), Some(peer));

        let clash = store.register_replica(ReplicaId(11), Uuid::new_v4());
        assert!(matches!(clash, Err(StoreError::ReplicaMismatch(_))));
        assert_eq!(store.replica_uuid(ReplicaId(12)).unwrap(), None);
    }

    #[test]
    fn counter_ticks_strictly_upward() {
        let store = MetaStore::in_memory(ReplicaId(10)).unwrap();
        let a = tick(&store.conn).unwrap();
        let b = tick(&store.conn).unwrap();
        let c = tick(&store.conn).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn object_records_roundtrip_through_storage() {
        let store = MetaStore::in_memory(ReplicaId(10)).unwrap();
        let mut clock = Clock::create(ReplicaId(10), 1);
        clock.update(ReplicaId(10), 2);
        let record = ObjectRecord {
            clock,
            tombstone: true,
        };

        save_object(&store.conn, "a/b.txt", &record).unwrap();
        let loaded = store.get("a/b.txt").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(store.get("missing").unwrap(), None);

        let all = store.list_objects().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].0, "a/b.txt");
    }
}
