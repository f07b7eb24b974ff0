//! Typed error handling for dispatch operations.

use herald_ledger::LedgerError;
use thiserror::Error;

/// Top-level dispatch error type.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Processor used before `init()` wired its collaborators.
    #[error("Dispatch processor not initialized: {0}")]
    NotInitialized(String),

    /// Ledger storage failure.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Other internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}
