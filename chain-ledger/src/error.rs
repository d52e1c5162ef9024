//! Error types for the ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Chain verification faults are not errors; they are reported as
/// [`crate::types::ChainStatus::Invalid`].
#[derive(Error, Debug)]
pub enum Error {
    /// Payload contains a value kind the canonicalizer cannot encode
    #[error("Unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    /// Event rejected by collaborator-side validation
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Store has no genesis block yet
    #[error("Ledger is not initialized: run genesis initialization first")]
    LedgerUninitialized,

    /// A block already exists at this height (write race)
    #[error("Duplicate block height: {0}")]
    DuplicateHeight(u64),

    /// Block not found
    #[error("Block not found at height {0}")]
    BlockNotFound(u64),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Block encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Payload decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller should retry the whole operation with a fresh tip read
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DuplicateHeight(_))
    }

    /// Whether the error was caused by bad caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedValueKind(_) | Error::InvalidEvent(_) | Error::BlockNotFound(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl serde::ser::Error for Error {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Error::UnsupportedValueKind(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_duplicate_height_is_retryable() {
        assert!(Error::DuplicateHeight(3).is_retryable());
        assert!(!Error::LedgerUninitialized.is_retryable());
        assert!(!Error::Storage("disk".into()).is_retryable());
    }

    #[test]
    fn test_client_errors() {
        assert!(Error::UnsupportedValueKind("bytes".into()).is_client_error());
        assert!(Error::InvalidEvent("name is required".into()).is_client_error());
        assert!(!Error::DuplicateHeight(1).is_client_error());
        assert!(!Error::LedgerUninitialized.is_client_error());
    }
}
