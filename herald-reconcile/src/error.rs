//! Error types for reconciliation runs.

use herald_ledger::LedgerError;
use thiserror::Error;

/// Failure reading from the raw activity source.
#[derive(Debug, Clone, Error)]
#[error("Activity log error: {0}")]
pub struct ActivityError(pub String);

/// Top-level reconciliation error.
///
/// A run aborts only on unrecoverable source or storage failure; a single
/// malformed row never surfaces here, it is skipped and counted instead.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The activity source failed.
    #[error(transparent)]
    Activity(#[from] ActivityError),

    /// The ledger store failed.
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
