//! Message types for replica state exchange.

use pairsync_core::{Clock, ReplicaId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Peer identification at the start of a sync session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerHello {
    /// Stable identity of the peer.
    pub replica_uuid: Uuid,
    /// The compact replica id this peer stamps into clocks. Must match the
    /// deployment-assigned registry on the receiving side.
    pub replica_id: ReplicaId,
    /// Peer software version.
    pub version: String,
}

impl PeerHello {
    /// Create a hello for the local replica.
    #[must_use]
    pub fn new(replica_uuid: Uuid, replica_id: ReplicaId) -> Self {
        Self {
            replica_uuid,
            replica_id,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| MessageError::Serialize(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// One object's synchronization metadata as held by the sending replica.
///
/// Content bytes travel separately through the content-addressed storage
/// layer; the receiver only needs the clock to make its decision and the
/// tombstone marker to know whether the sender still has the object at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectState {
    /// Object path relative to the replicated root.
    pub path: String,
    /// The sender's clock for the object.
    pub clock: Clock,
    /// `true` if the sender holds this object as deleted.
    pub tombstone: bool,
}

impl ObjectState {
    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| MessageError::Serialize(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// A set of object states offered during an anti-entropy sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateBatch {
    /// The offered states, in no particular order.
    pub states: Vec<ObjectState>,
}

impl StateBatch {
    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| MessageError::Serialize(e.to_string()))?;
        Ok(bytes)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
    }
}

/// Errors for message serialization/deserialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairsync_core::ReplicaId;

    #[test]
    fn peer_hello_cbor_roundtrip() {
        let hello = PeerHello::new(Uuid::new_v4(), ReplicaId(10));

        let bytes = hello.to_cbor().unwrap();
        let decoded = PeerHello::from_cbor(&bytes).unwrap();

        assert_eq!(hello.replica_uuid, decoded.replica_uuid);
        assert_eq!(hello.replica_id, decoded.replica_id);
    }

    #[test]
    fn object_state_cbor_roundtrip() {
        let mut clock = Clock::create(ReplicaId(10), 1);
        clock.update(ReplicaId(10), 3);

        let state = ObjectState {
            path: "docs/notes.txt".to_string(),
            clock: clock.clone(),
            tombstone: false,
        };

        let bytes = state.to_cbor().unwrap();
        let decoded = ObjectState::from_cbor(&bytes).unwrap();

        assert_eq!(decoded.path, state.path);
        assert_eq!(decoded.clock, clock);
        assert!(!decoded.tombstone);
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        let state = ObjectState {
            path: "a".to_string(),
            clock: Clock::create(ReplicaId(1), 1),
            tombstone: true,
        };
        let bytes = state.to_cbor().unwrap();
        assert!(ObjectState::from_cbor(&bytes[..bytes.len() / 2]).is_err());
    }
}
