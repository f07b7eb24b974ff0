//! Daemon assembly and lifecycle.

use std::sync::Arc;

use herald_common::{Signal, internal};
use herald_dispatch::ProviderRegistry;
use herald_ledger::{FileLedger, LedgerStore, MemoryLedger};
use herald_provider::Transport;
use tokio::sync::broadcast;

use crate::{
    config::{HeraldConfig, LedgerConfig},
    source::RecordMessageSource,
    transport::SinkTransport,
};

/// The assembled delivery service.
#[derive(Debug)]
pub struct Service {
    config: HeraldConfig,
    transport: Arc<dyn Transport>,
}

impl Service {
    /// Load configuration and assemble the service with the development
    /// sink transport.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let config = HeraldConfig::from_file(path)?;
        Ok(Self::new(config, Arc::new(SinkTransport)))
    }

    /// Assemble the service over an explicit transport implementation.
    #[must_use]
    pub fn new(config: HeraldConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Run the dispatch processor until a shutdown signal arrives.
    ///
    /// # Errors
    /// Returns an error if the ledger cannot be opened, a provider fails
    /// validation, or the processor aborts.
    pub async fn serve(self, shutdown: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        let ledger: Arc<dyn LedgerStore> = match &self.config.ledger {
            LedgerConfig::Memory => Arc::new(MemoryLedger::new()),
            LedgerConfig::File(file) => Arc::new(FileLedger::open(&file.path).await?),
        };

        let registry = Arc::new(ProviderRegistry::new());
        for provider_config in self.config.providers {
            let channel = provider_config.channel();
            registry.register(provider_config.build(Arc::clone(&self.transport))?);
            internal!(level = INFO, "Registered {channel} provider");
        }

        let mut processor = self.config.dispatch;
        processor
            .init(ledger, registry, Arc::new(RecordMessageSource))
            .await;
        processor.serve(shutdown).await?;

        Ok(())
    }
}
