//! Top-level TOML configuration.

use std::path::{Path, PathBuf};

use herald_dispatch::DispatchProcessor;
use herald_provider::ProviderConfig;
use serde::Deserialize;

/// Configuration for the herald daemon.
///
/// Parsed strictly: unknown top-level fields are rejected, and every
/// provider entry is validated before any network use.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeraldConfig {
    /// Where send records and delivery events live.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Dispatch processor tuning (intervals, retry, rate limits).
    #[serde(default)]
    pub dispatch: DispatchProcessor,

    /// Channel providers to register.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Ledger backend selection.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LedgerConfig {
    /// Volatile in-memory ledger (development and tests).
    #[default]
    Memory,
    /// Durable file-backed ledger.
    File(FileLedgerConfig),
}

/// Settings for the file-backed ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLedgerConfig {
    /// Root directory for record and event rows.
    pub path: PathBuf,
}

impl HeraldConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, fails to parse, or any
    /// provider configuration is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&raw)?;
        for provider in &config.providers {
            provider.validate()?;
        }
        Ok(config)
    }
}
