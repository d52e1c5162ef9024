//! Main ledger orchestration layer
//!
//! This module ties together storage, canonicalization and hashing into the
//! high-level API used by the service layer. [`Ledger`] is the only place
//! blocks are built.
//!
//! # Example
//!
//! ```no_run
//! use chain_ledger::{Config, Ledger};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> chain_ledger::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!     ledger.ensure_genesis().await?;
//!
//!     let receipt = ledger
//!         .append("activity_submission", &json!({"user_id": "u1"}))
//!         .await?;
//!     assert_eq!(receipt.height, 1);
//!
//!     assert!(ledger.verify_chain().await?.is_valid());
//!     Ok(())
//! }
//! ```

use crate::{
    canonical,
    crypto::GENESIS_PREV_HASH,
    events::LedgerEvent,
    metrics::Metrics,
    storage::{validate_event_type, StoredBlock},
    types::{
        AppendReceipt, Block, ChainFault, ChainStatus, EventRecord, GENESIS_EVENT_TYPE,
        PAYLOAD_VERSION,
    },
    Config, Error, Result, Storage,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Main ledger interface
pub struct Ledger {
    /// Block store (sole owner of chain state)
    storage: Arc<Storage>,

    /// Serializes read-tip → insert
    write_lock: Mutex<()>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("storage", &self.storage)
            .field("data_dir", &self.config.data_dir)
            .finish()
    }
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        Ok(Self::with_storage(storage, config))
    }

    /// Build a ledger over an already opened store
    pub fn with_storage(storage: Arc<Storage>, config: Config) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
            metrics: Metrics::default(),
            config,
        }
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write the genesis block if the store is empty
    ///
    /// Returns the receipt when a block was written, `None` when the chain
    /// already had one. Existing blocks are never re-validated or replaced.
    pub async fn ensure_genesis(&self) -> Result<Option<AppendReceipt>> {
        let _guard = self.write_lock.lock().await;

        if let Some(tip) = self.storage.get_tip()? {
            tracing::debug!(tip_height = tip.height, "Genesis already present");
            return Ok(None);
        }

        let payload = json!({
            "event_type": GENESIS_EVENT_TYPE,
            "version": PAYLOAD_VERSION,
            "note": self.config.ledger.genesis_note,
        });
        let block = Block::seal(
            0,
            Utc::now().timestamp(),
            GENESIS_PREV_HASH,
            GENESIS_EVENT_TYPE,
            canonical::to_canonical_bytes(&payload)?,
        );

        match self.storage.insert_block(&block) {
            Ok(()) => {}
            // Another writer on the same store got there first
            Err(Error::DuplicateHeight(0)) => return Ok(None),
            Err(e) => return Err(e),
        }

        self.metrics.record_append(0, 0.0);
        tracing::info!(hash = %block.hash, "Genesis block created");

        Ok(Some(block.receipt()))
    }

    /// Append an event to the chain
    ///
    /// `payload` must serialize to a mapping. It is stamped with
    /// `event_type` and `version = 1`, canonicalized, and sealed into the
    /// block after the current tip.
    pub async fn append<P>(&self, event_type: &str, payload: &P) -> Result<AppendReceipt>
    where
        P: ?Sized + Serialize,
    {
        let result = match stamp_payload(event_type, payload) {
            Ok(bytes) => self.append_canonical(event_type, bytes).await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            self.metrics.record_append_failure();
            tracing::warn!(event_type, error = %e, "Append failed");
        }

        result
    }

    /// Append one of the known event kinds
    pub async fn append_event(&self, event: &LedgerEvent) -> Result<AppendReceipt> {
        self.append(event.event_type(), event).await
    }

    async fn append_canonical(&self, event_type: &str, payload: Vec<u8>) -> Result<AppendReceipt> {
        let started = Instant::now();
        let max_attempts = self.config.ledger.max_append_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.try_append(event_type, &payload).await {
                Ok(block) => {
                    self.metrics
                        .record_append(block.height, started.elapsed().as_secs_f64());
                    tracing::info!(
                        height = block.height,
                        event_type,
                        hash = %block.hash,
                        "Block appended"
                    );
                    return Ok(block.receipt());
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(attempt, error = %e, "Write race detected, retrying append");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One read-tip → seal → insert pass under the write lock
    async fn try_append(&self, event_type: &str, payload: &[u8]) -> Result<Block> {
        let _guard = self.write_lock.lock().await;

        let tip = self.storage.get_tip()?.ok_or(Error::LedgerUninitialized)?;
        let height = tip
            .height
            .checked_add(1)
            .ok_or_else(|| Error::Storage("Chain height overflow".to_string()))?;

        let block = Block::seal(
            height,
            Utc::now().timestamp(),
            tip.hash,
            event_type,
            payload.to_vec(),
        );
        self.storage.insert_block(&block)?;

        Ok(block)
    }

    /// Decoded payloads of every block with `event_type`, ascending by height
    pub async fn list_by_type(&self, event_type: &str) -> Result<Vec<EventRecord>> {
        self.storage
            .list_by_type(event_type)?
            .iter()
            .map(Block::record)
            .collect()
    }

    /// Raw blocks with `event_type`, ascending by height
    pub async fn list_blocks_by_type(&self, event_type: &str) -> Result<Vec<Block>> {
        self.storage.list_by_type(event_type)
    }

    /// Get block by height
    pub async fn get_block(&self, height: u64) -> Result<Block> {
        self.storage.get_block(height)
    }

    /// Current tip, `None` before genesis
    pub async fn tip(&self) -> Result<Option<Block>> {
        self.storage.get_tip()
    }

    /// Storage statistics
    pub async fn stats(&self) -> Result<crate::storage::StorageStats> {
        self.storage.stats()
    }

    /// Verify linkage and hashes of the whole chain
    ///
    /// Chain faults come back as [`ChainStatus::Invalid`]; only storage
    /// failures are errors.
    pub async fn verify_chain(&self) -> Result<ChainStatus> {
        let blocks = self.storage.scan_blocks()?;
        let status = verify_blocks(&blocks);

        self.metrics.record_verification(status.is_valid());
        match status.fault() {
            None => tracing::info!(blocks = blocks.len(), "Chain verified"),
            Some(fault) => tracing::warn!(
                blocks = blocks.len(),
                height = ?fault.height(),
                fault = %fault,
                "Chain verification failed"
            ),
        }

        Ok(status)
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!(data_dir = ?self.config.data_dir, "Closing ledger");
        drop(self);
        Ok(())
    }
}

/// Stamp `event_type` and `version` onto a payload and canonicalize it
fn stamp_payload<P>(event_type: &str, payload: &P) -> Result<Vec<u8>>
where
    P: ?Sized + Serialize,
{
    validate_event_type(event_type)?;

    // Canonical text first, so f32 fields keep their shortest form rather
    // than a widened f64 one
    let canonical = canonical::to_canonical_bytes(payload)?;

    let mut fields = match serde_json::from_slice::<Value>(&canonical)? {
        Value::Object(fields) => fields,
        other => {
            return Err(Error::UnsupportedValueKind(format!(
                "payload must be a mapping, got {}",
                value_kind(&other)
            )))
        }
    };
    fields.insert("event_type".to_string(), Value::from(event_type));
    fields.insert("version".to_string(), Value::from(PAYLOAD_VERSION));

    canonical::to_canonical_bytes(&fields)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Replay linkage and hash checks over stored rows in ascending height order
///
/// Stops at the first fault. A block at height 0 must carry the sentinel
/// `prev_hash`; any other block must link to the stored hash of the block
/// before it in `blocks`. A row that no longer decodes cannot reproduce its
/// hash and is reported as a hash mismatch at its key height.
pub fn verify_blocks(blocks: &[StoredBlock]) -> ChainStatus {
    if blocks.is_empty() {
        return ChainStatus::Invalid(ChainFault::NoBlocks);
    }

    let mut previous: Option<&Block> = None;
    for row in blocks {
        let block = match row {
            StoredBlock::Decoded(block) => block,
            StoredBlock::Undecodable { height } => {
                return ChainStatus::Invalid(ChainFault::HashMismatch { height: *height })
            }
        };
        let height = block.height;

        if height == 0 {
            if block.prev_hash != GENESIS_PREV_HASH {
                return ChainStatus::Invalid(ChainFault::InvalidGenesis { height });
            }
        } else {
            match previous {
                Some(prev) if prev.hash == block.prev_hash => {}
                _ => return ChainStatus::Invalid(ChainFault::BrokenChain { height }),
            }
        }

        if !block.is_sealed_correctly() {
            return ChainStatus::Invalid(ChainFault::HashMismatch { height });
        }

        previous = Some(block);
    }

    ChainStatus::Valid
}
