//! Durable send-state ledger for the delivery pipeline.
//!
//! The ledger owns two row families:
//! - [`SendRecord`]: per-recipient dispatch state (`pending -> sent|failed`)
//! - [`DeliveryEvent`]: the canonical, append-only record of what happened
//!
//! Both are keyed for conflict purposes by [`EventKey`], the
//! `(campaign_id, user_id, channel, reference_id)` tuple. Stores expose an
//! insert-or-ignore primitive on that key so that concurrent writers (the
//! dispatcher and the reconciler) can never produce two differing terminal
//! rows for the same logical send.

pub mod error;
pub mod file;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{LedgerError, Result, SerializationError};
pub use file::FileLedger;
pub use memory::MemoryLedger;
pub use store::{LedgerStats, LedgerStore};
pub use types::{DeliveryEvent, EventKey, EventKind, SendRecord, SendState};
