//! Command-line utility for operating the herald delivery pipeline
//!
//! This tool provides operational control over the pipeline, including:
//! - Reconciling delivery events from a raw activity log export
//! - Inspecting ledger state (counts, pending sends)

use std::{path::PathBuf, process::ExitCode};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use herald_ledger::{FileLedger, LedgerStore};
use herald_reconcile::{MemoryActivityLog, RawActivityRecord, Reconciler};

/// Command-line utility for operating the herald delivery pipeline
#[derive(Parser, Debug)]
#[command(name = "heraldctl")]
#[command(about = "Manage the herald delivery pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the file ledger root
    #[arg(short, long, default_value = "/var/lib/herald/ledger")]
    ledger_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebuild canonical delivery events from a raw activity log export
    Reconcile {
        /// Project to reconcile
        #[arg(long)]
        project: u64,

        /// Inclusive window start (RFC 3339)
        #[arg(long)]
        from: DateTime<Utc>,

        /// Inclusive window end (RFC 3339)
        #[arg(long)]
        to: DateTime<Utc>,

        /// Rows fetched per batch
        #[arg(long, default_value_t = 1000)]
        batch: usize,

        /// Report the would-be inserts without writing
        #[arg(long)]
        dry_run: bool,

        /// JSON-lines file of raw activity records
        #[arg(long)]
        activity_log: PathBuf,
    },
    /// Ledger inspection commands
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerAction {
    /// Show row counts by state
    Stats,
    /// List pending sends that are due now
    Pending,
}

#[tokio::main]
async fn main() -> ExitCode {
    herald_common::logging::init();

    // Missing required parameters fail here, before any I/O.
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("heraldctl: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Reconcile {
            project,
            from,
            to,
            batch,
            dry_run,
            activity_log,
        } => {
            let log = load_activity_log(&activity_log)?;
            let ledger = FileLedger::open(&cli.ledger_path).await?;

            let report = Reconciler::new(project, from, to)
                .with_batch(batch)
                .with_dry_run(dry_run)
                .run(&log, &ledger)
                .await?;

            println!("Scanned:      {}", report.scanned);
            println!("Derived:      {}", report.derived);
            println!("Skipped:      {}", report.skipped);
            if dry_run {
                println!("Would insert: {}", report.would_insert);
                for event in &report.sample {
                    println!(
                        "  sample: {} {} ({})",
                        event.key(),
                        event.event,
                        event.created_at
                    );
                }
            } else {
                println!("Inserted:     {}", report.inserted);
            }
        }
        Commands::Ledger { action } => {
            let ledger = FileLedger::open(&cli.ledger_path).await?;
            match action {
                LedgerAction::Stats => {
                    let stats = ledger.stats().await?;
                    println!("Pending: {}", stats.pending);
                    println!("Sent:    {}", stats.sent);
                    println!("Failed:  {}", stats.failed);
                    println!("Events:  {}", stats.events);
                }
                LedgerAction::Pending => {
                    let due = ledger.find_pending(Utc::now()).await?;
                    if due.is_empty() {
                        println!("No pending sends due");
                    }
                    for record in due {
                        println!("{}  scheduled {}", record.key(), record.send_at);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Read a JSON-lines activity export into an in-memory log.
///
/// Malformed lines are skipped with a note; a partial export must not block
/// reconciling the rest.
fn load_activity_log(path: &std::path::Path) -> anyhow::Result<MemoryActivityLog> {
    let raw = std::fs::read_to_string(path)?;
    let log = MemoryActivityLog::new();
    let mut skipped = 0usize;

    for line in raw.lines().filter(|line| !line.trim().is_empty()) {
        match serde_json::from_str::<RawActivityRecord>(line) {
            Ok(record) => log.push(record),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        eprintln!("heraldctl: skipped {skipped} malformed activity line(s)");
    }

    Ok(log)
}
