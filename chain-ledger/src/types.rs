//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode on disk, canonical JSON for payloads)
//! - Memory safety (no unsafe code)
//! - Immutability once sealed into a block

use crate::crypto;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Event type of the height-0 block
pub const GENESIS_EVENT_TYPE: &str = "genesis";

/// Schema version stamped on every payload
pub const PAYLOAD_VERSION: u64 = 1;

/// One immutable record of the hash chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Zero-based position in the chain (primary key)
    pub height: u64,

    /// Seconds since the Unix epoch, recorded at append time
    pub timestamp: i64,

    /// Hash of the block at `height - 1`, or the zero sentinel at height 0
    pub prev_hash: String,

    /// Digest of `(height, timestamp, prev_hash, payload)`
    pub hash: String,

    /// Event classification tag
    pub event_type: String,

    /// Canonical payload bytes, exactly as hashed
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl Block {
    /// Build a block and compute its hash
    pub fn seal(
        height: u64,
        timestamp: i64,
        prev_hash: impl Into<String>,
        event_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        let prev_hash = prev_hash.into();
        let hash = crypto::hash_block(height, timestamp, &prev_hash, &payload);
        Self {
            height,
            timestamp,
            prev_hash,
            hash,
            event_type: event_type.into(),
            payload,
        }
    }

    /// Recompute the hash from the stored fields
    pub fn compute_hash(&self) -> String {
        crypto::hash_block(self.height, self.timestamp, &self.prev_hash, &self.payload)
    }

    /// Whether the stored hash matches the stored contents
    pub fn is_sealed_correctly(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Decode the stored payload
    pub fn record(&self) -> crate::Result<EventRecord> {
        Ok(serde_json::from_slice(&self.payload)?)
    }

    /// Payload as text (payloads are canonical ASCII JSON)
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<non-utf8 payload>")
    }

    /// Receipt handed back to the appender
    pub fn receipt(&self) -> AppendReceipt {
        AppendReceipt {
            height: self.height,
            hash: self.hash.clone(),
            event_type: self.event_type.clone(),
            timestamp: self.timestamp,
            prev_hash: self.prev_hash.clone(),
        }
    }
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendReceipt {
    /// Height of the new block
    pub height: u64,

    /// Hash of the new block
    pub hash: String,

    /// Event type of the new block
    pub event_type: String,

    /// Block timestamp (seconds)
    pub timestamp: i64,

    /// Hash the new block links to
    pub prev_hash: String,
}

/// Decoded payload of a block
///
/// Holds the caller's original fields plus `event_type` and `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventRecord(Map<String, Value>);

impl EventRecord {
    /// The `event_type` field
    pub fn event_type(&self) -> Option<&str> {
        self.0.get("event_type").and_then(Value::as_str)
    }

    /// The `version` field
    pub fn version(&self) -> Option<u64> {
        self.0.get("version").and_then(Value::as_u64)
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// All fields
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into the field map
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Outcome of a full-chain verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    /// Every block links to its predecessor and hashes correctly
    Valid,
    /// The first fault found, scanning from height 0
    Invalid(ChainFault),
}

impl ChainStatus {
    /// Whether the chain verified
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainStatus::Valid)
    }

    /// The fault, if any
    pub fn fault(&self) -> Option<&ChainFault> {
        match self {
            ChainStatus::Valid => None,
            ChainStatus::Invalid(fault) => Some(fault),
        }
    }
}

/// Reason a chain failed verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFault {
    /// Store holds no blocks
    NoBlocks,
    /// First block is not a proper genesis block
    InvalidGenesis {
        /// Height of the offending block
        height: u64,
    },
    /// `prev_hash` does not match the preceding block's stored hash
    BrokenChain {
        /// Height of the block whose link is broken
        height: u64,
    },
    /// Stored hash does not match the recomputed hash
    HashMismatch {
        /// Height of the tampered block
        height: u64,
    },
}

impl ChainFault {
    /// Height the fault was detected at
    pub fn height(&self) -> Option<u64> {
        match self {
            ChainFault::NoBlocks => None,
            ChainFault::InvalidGenesis { height }
            | ChainFault::BrokenChain { height }
            | ChainFault::HashMismatch { height } => Some(*height),
        }
    }
}

impl fmt::Display for ChainFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainFault::NoBlocks => write!(f, "No blocks found"),
            ChainFault::InvalidGenesis { .. } => write!(f, "Invalid genesis block"),
            ChainFault::BrokenChain { height } => write!(f, "Broken chain at height {}", height),
            ChainFault::HashMismatch { height } => write!(f, "Hash mismatch at height {}", height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::GENESIS_PREV_HASH;

    #[test]
    fn test_seal_computes_hash() {
        let block = Block::seal(0, 1_700_000_000, GENESIS_PREV_HASH, "genesis", b"{}".to_vec());
        assert_eq!(block.hash.len(), 64);
        assert!(block.is_sealed_correctly());
        assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn test_tampered_payload_breaks_seal() {
        let mut block = Block::seal(3, 10, GENESIS_PREV_HASH, "x", br#"{"a":1}"#.to_vec());
        block.payload[5] = b'2';
        assert!(!block.is_sealed_correctly());
    }

    #[test]
    fn test_block_bincode_round_trip_keeps_payload_verbatim() {
        let payload = br#"{"event_type":"genesis","version":1}"#.to_vec();
        let block = Block::seal(0, 42, GENESIS_PREV_HASH, "genesis", payload.clone());
        let bytes = bincode::serialize(&block).unwrap();
        let decoded: Block = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded.payload, payload);
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_record_accessors() {
        let block = Block::seal(
            1,
            42,
            GENESIS_PREV_HASH,
            "activity_submission",
            br#"{"event_type":"activity_submission","user_id":"u1","version":1}"#.to_vec(),
        );
        let record = block.record().unwrap();
        assert_eq!(record.event_type(), Some("activity_submission"));
        assert_eq!(record.version(), Some(1));
        assert_eq!(record.get("user_id").and_then(Value::as_str), Some("u1"));
    }

    #[test]
    fn test_fault_messages() {
        assert_eq!(ChainFault::NoBlocks.to_string(), "No blocks found");
        assert_eq!(
            ChainFault::InvalidGenesis { height: 0 }.to_string(),
            "Invalid genesis block"
        );
        assert_eq!(
            ChainFault::BrokenChain { height: 4 }.to_string(),
            "Broken chain at height 4"
        );
        assert_eq!(
            ChainFault::HashMismatch { height: 2 }.to_string(),
            "Hash mismatch at height 2"
        );
        assert_eq!(ChainFault::NoBlocks.height(), None);
        assert_eq!(ChainFault::HashMismatch { height: 2 }.height(), Some(2));
    }

    #[test]
    fn test_chain_status() {
        assert!(ChainStatus::Valid.is_valid());
        let invalid = ChainStatus::Invalid(ChainFault::NoBlocks);
        assert!(!invalid.is_valid());
        assert_eq!(invalid.fault(), Some(&ChainFault::NoBlocks));
    }
}
