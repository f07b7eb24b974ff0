//! Service assembly for the herald delivery pipeline.
//!
//! Ties the member crates together: configuration loading, provider
//! construction, ledger selection, and the dispatch processor lifecycle.

pub mod config;
pub mod service;
pub mod source;
pub mod transport;

pub use config::{HeraldConfig, LedgerConfig};
pub use service::Service;
pub use source::RecordMessageSource;
pub use transport::SinkTransport;
