//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `blocks` - Hash-chained blocks (key: big-endian block height)
//! - `event_types` - Secondary index (key: event_type || 0x00 || height)
//!
//! [`Storage::insert_block`] is the only write path. It writes the block and
//! its index entry in one `WriteBatch`, so a crash never leaves a block
//! without its index entry or the other way around.

use crate::{
    error::{Error, Result},
    types::Block,
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompressionType, Direction, IteratorMode, Options,
    WriteBatch, WriteOptions, DB,
};
use std::collections::BTreeMap;

/// Column family holding blocks keyed by height
pub const CF_BLOCKS: &str = "blocks";

/// Column family holding the event type index
pub const CF_EVENT_TYPES: &str = "event_types";

/// Separates event type from height in index keys
const INDEX_SEPARATOR: u8 = 0x00;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,

    /// Serializes the existence check and write of `insert_block`
    insert_lock: Mutex<()>,

    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BLOCKS, Self::cf_options_blocks(config)),
            ColumnFamilyDescriptor::new(CF_EVENT_TYPES, Self::cf_options_event_types()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened block store");

        Ok(Self {
            db,
            insert_lock: Mutex::new(()),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_blocks(config: &Config) -> Options {
        let mut opts = Options::default();
        if config.rocksdb.compress {
            opts.set_compression_type(DBCompressionType::Zstd);
            opts.set_bottommost_compression_type(DBCompressionType::Zstd);
        } else {
            opts.set_compression_type(DBCompressionType::None);
        }
        opts
    }

    fn cf_options_event_types() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Block operations

    /// Insert a block at its height
    ///
    /// Fails with [`Error::DuplicateHeight`] if the height is taken.
    pub fn insert_block(&self, block: &Block) -> Result<()> {
        validate_event_type(&block.event_type)?;

        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_index = self.cf_handle(CF_EVENT_TYPES)?;

        let key = block.height.to_be_bytes();
        let value = bincode::serialize(block)?;
        let index_key = Self::index_key(&block.event_type, Some(block.height));

        let _guard = self.insert_lock.lock();

        if self.db.get_cf(cf_blocks, key)?.is_some() {
            return Err(Error::DuplicateHeight(block.height));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_blocks, key, &value);
        batch.put_cf(cf_index, &index_key, b"");

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            height = block.height,
            event_type = %block.event_type,
            payload_len = block.payload.len(),
            "Block inserted"
        );

        Ok(())
    }

    /// Get block by height
    pub fn get_block(&self, height: u64) -> Result<Block> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        let value = self
            .db
            .get_cf(cf, height.to_be_bytes())?
            .ok_or(Error::BlockNotFound(height))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Block with the maximum height, `None` if the store is empty
    pub fn get_tip(&self) -> Result<Option<Block>> {
        let cf = self.cf_handle(CF_BLOCKS)?;

        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (_, value) = item?;
                Ok(Some(bincode::deserialize(&value)?))
            }
            None => Ok(None),
        }
    }

    /// All blocks with `event_type`, ascending by height
    pub fn list_by_type(&self, event_type: &str) -> Result<Vec<Block>> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_index = self.cf_handle(CF_EVENT_TYPES)?;

        let snapshot = self.db.snapshot();
        let prefix = Self::index_key(event_type, None);

        let mut blocks = Vec::new();
        let iter = snapshot.iterator_cf(
            cf_index,
            IteratorMode::From(prefix.as_slice(), Direction::Forward),
        );
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let height = Self::height_from_index_key(&key)?;
            let value = snapshot
                .get_cf(cf_blocks, height.to_be_bytes())?
                .ok_or_else(|| {
                    Error::Storage(format!(
                        "Index entry for {} points at missing block {}",
                        event_type, height
                    ))
                })?;
            blocks.push(bincode::deserialize(&value)?);
        }

        Ok(blocks)
    }

    /// Every row of the blocks column family, ascending by height, read from
    /// one snapshot
    ///
    /// Rows are decoded one at a time. A value that no longer decodes comes
    /// back as [`StoredBlock::Undecodable`] with its key height; only
    /// RocksDB failures and malformed keys are errors.
    pub fn scan_blocks(&self) -> Result<Vec<StoredBlock>> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        let snapshot = self.db.snapshot();

        let mut rows = Vec::new();
        for item in snapshot.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let height = Self::height_from_block_key(&key)?;
            match bincode::deserialize::<Block>(&value) {
                Ok(block) => rows.push(StoredBlock::Decoded(block)),
                Err(e) => {
                    tracing::warn!(height, error = %e, "Undecodable block row");
                    rows.push(StoredBlock::Undecodable { height });
                }
            }
        }

        Ok(rows)
    }

    // Index key helpers

    fn index_key(event_type: &str, height: Option<u64>) -> Vec<u8> {
        let mut key = event_type.as_bytes().to_vec();
        key.push(INDEX_SEPARATOR);
        if let Some(height) = height {
            key.extend_from_slice(&height.to_be_bytes());
        }
        key
    }

    fn height_from_block_key(key: &[u8]) -> Result<u64> {
        let height: [u8; 8] = key.try_into().map_err(|_| {
            Error::Storage(format!("Malformed block key of {} bytes", key.len()))
        })?;
        Ok(u64::from_be_bytes(height))
    }

    fn height_from_index_key(key: &[u8]) -> Result<u64> {
        if key.len() < 9 {
            return Err(Error::Storage(format!(
                "Malformed index key of {} bytes",
                key.len()
            )));
        }
        let mut height = [0u8; 8];
        height.copy_from_slice(&key[key.len() - 8..]);
        Ok(u64::from_be_bytes(height))
    }

    // Statistics

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        let cf_index = self.cf_handle(CF_EVENT_TYPES)?;
        let snapshot = self.db.snapshot();

        let mut total_blocks = 0u64;
        for item in snapshot.iterator_cf(cf_blocks, IteratorMode::Start) {
            item?;
            total_blocks += 1;
        }

        let mut event_types: BTreeMap<String, u64> = BTreeMap::new();
        for item in snapshot.iterator_cf(cf_index, IteratorMode::Start) {
            let (key, _) = item?;
            let type_len = key.len().saturating_sub(9);
            let event_type = String::from_utf8_lossy(&key[..type_len]).into_owned();
            *event_types.entry(event_type).or_insert(0) += 1;
        }

        Ok(StorageStats {
            total_blocks,
            event_types,
        })
    }

    #[cfg(test)]
    pub(crate) fn overwrite_block_unchecked(&self, block: &Block) -> Result<()> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db
            .put_cf(cf, block.height.to_be_bytes(), bincode::serialize(block)?)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn put_raw_unchecked(&self, height: u64, value: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db.put_cf(cf, height.to_be_bytes(), value)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn delete_block_unchecked(&self, height: u64) -> Result<()> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        self.db.delete_cf(cf, height.to_be_bytes())?;
        Ok(())
    }
}

/// Event types become index key prefixes, so they must be non-empty and NUL-free
pub fn validate_event_type(event_type: &str) -> Result<()> {
    if event_type.is_empty() {
        return Err(Error::InvalidEvent("event_type must not be empty".to_string()));
    }
    if event_type.as_bytes().contains(&INDEX_SEPARATOR) {
        return Err(Error::InvalidEvent(
            "event_type must not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}

/// Storage statistics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StorageStats {
    /// Number of blocks
    pub total_blocks: u64,
    /// Block count per event type
    pub event_types: BTreeMap<String, u64>,
}

/// A row read back by [`Storage::scan_blocks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredBlock {
    Decoded(Block),
    /// The value under this height no longer decodes as a block
    Undecodable { height: u64 },
}

impl StoredBlock {
    /// Height from the row's key
    pub fn height(&self) -> u64 {
        match self {
            StoredBlock::Decoded(block) => block.height,
            StoredBlock::Undecodable { height } => *height,
        }
    }

    /// The decoded block, if any
    pub fn block(&self) -> Option<&Block> {
        match self {
            StoredBlock::Decoded(block) => Some(block),
            StoredBlock::Undecodable { .. } => None,
        }
    }
}

impl From<Block> for StoredBlock {
    fn from(block: Block) -> Self {
        StoredBlock::Decoded(block)
    }
}
