//! Store configuration.

use crate::store::MetaStore;
use anyhow::{Context, Result};
use pairsync_core::ReplicaId;
use std::path::PathBuf;
use uuid::Uuid;

/// Configuration for opening the local metadata store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database path.
    pub db_path: PathBuf,

    /// Deployment-assigned compact id for this replica.
    pub replica_id: ReplicaId,

    /// Optional explicit peer identity; minted and persisted on first open
    /// when absent.
    pub replica_uuid: Option<Uuid>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./pairsync.db"),
            replica_id: ReplicaId(0),
            replica_uuid: None,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PAIRSYNC_DB_PATH`: database path
    /// - `PAIRSYNC_REPLICA_ID`: compact replica id (u32)
    /// - `PAIRSYNC_REPLICA_UUID`: explicit peer identity
    ///
    /// # Errors
    ///
    /// Returns error if a present variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("PAIRSYNC_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Ok(id) = std::env::var("PAIRSYNC_REPLICA_ID") {
            let id: u32 = id.parse().context("Invalid PAIRSYNC_REPLICA_ID")?;
            config.replica_id = ReplicaId(id);
        }

        if let Ok(uuid) = std::env::var("PAIRSYNC_REPLICA_UUID") {
            config.replica_uuid =
                Some(Uuid::parse_str(&uuid).context("Invalid PAIRSYNC_REPLICA_UUID")?);
        }

        Ok(config)
    }

    /// Open the store described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be opened.
    pub fn open(&self) -> Result<MetaStore> {
        let store = match self.replica_uuid {
            Some(uuid) => MetaStore::open_as(&self.db_path, self.replica_id, uuid),
            None => MetaStore::open(&self.db_path, self.replica_id),
        };
        store.with_context(|| format!("Failed to open store at {}", self.db_path.display()))
    }
}
