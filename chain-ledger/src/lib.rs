//! Chain Ledger
//!
//! Tamper-evident, append-only event log. Every event is sealed into a block
//! whose SHA-256 hash covers its height, timestamp, canonical payload and the
//! hash of the block before it.
//!
//! # Architecture
//!
//! - **Canonical payloads**: sorted-key compact JSON, byte-identical for
//!   equal mappings
//! - **Single write path**: [`Ledger`] is the only component that builds
//!   blocks; appends are serialized and committed atomically
//! - **Verification as data**: chain faults come back as
//!   [`ChainStatus::Invalid`], never as errors
//!
//! # Invariants
//!
//! - Heights are contiguous from 0 with no gaps or duplicates
//! - Block `h` links to the stored hash of block `h - 1`
//! - Blocks are never updated or deleted after insert

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod api;
pub mod canonical;
pub mod config;
pub mod crypto;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use api::EventApi;
pub use config::Config;
pub use error::{Error, Result};
pub use events::{Activity, ActivitySubmission, LedgerEvent};
pub use ledger::Ledger;
pub use storage::{Storage, StoredBlock};
pub use types::{AppendReceipt, Block, ChainFault, ChainStatus, EventRecord};
