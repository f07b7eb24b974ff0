//! The herald delivery daemon.

use std::path::PathBuf;

use clap::Parser;
use herald::Service;
use herald_common::Signal;
use tokio::sync::broadcast;

/// Multi-channel outbound message delivery daemon
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Run the herald delivery pipeline", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./herald.config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald_common::logging::init();

    let args = Args::parse();
    let service = Service::from_config_file(&args.config)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(Signal::Shutdown);
        }
    });

    service.serve(shutdown_rx).await
}
