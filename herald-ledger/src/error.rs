//! Error types for ledger operations.

use std::io;

use thiserror::Error;

use crate::EventKey;

/// Top-level ledger error type.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O operation failed (file read/write/rename).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// No record exists for the given conflict key.
    #[error("Record not found: {0}")]
    NotFound(EventKey),

    /// Internal error (lock poisoning, invalid store state, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Row data is corrupted or incomplete.
    #[error("Invalid row format: {0}")]
    InvalidFormat(String),
}

/// Specialized `Result` type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
