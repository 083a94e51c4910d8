//! Migration error types

use std::path::PathBuf;
use thiserror::Error;

/// Migration result type
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Errors that stop the current pass
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Failed to open source store {path}: {reason}")]
    OpenSource { path: PathBuf, reason: String },

    #[error("Failed to open destination store {path}: {reason}")]
    OpenDestination { path: PathBuf, reason: String },

    #[error("Batch commit failed after {committed} records: {reason}")]
    BatchCommit { committed: u64, reason: String },

    #[error("ParityDB error: {0}")]
    ParityDBError(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Migration cancelled after {committed} committed records")]
    Cancelled { committed: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid block range: {from} > {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("Unknown network ID: {0}")]
    UnknownNetwork(u64),

    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskJoin(String),
}

impl From<parity_db::Error> for MigrationError {
    fn from(err: parity_db::Error) -> Self {
        MigrationError::ParityDBError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for MigrationError {
    fn from(err: tokio::task::JoinError) -> Self {
        MigrationError::TaskJoin(err.to_string())
    }
}

/// Problems confined to a single record.
///
/// These are counted and logged by the pass that hits them; they never abort
/// a pass.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Unclassified key {}", hex::encode(.key))]
    Unclassified { key: Vec<u8> },

    #[error("Malformed canonical record {} ({value_len}-byte value)", hex::encode(.key))]
    MalformedCanonical { key: Vec<u8>, value_len: usize },
}
