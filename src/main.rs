//! Permisync - Offline-first leave/permit record sync
//!
//! Main entry point for the permisync CLI.

use clap::{Parser, Subcommand};
use permisync::backup::{BackupConfig, BackupStore};
use permisync::config::SyncConfig;
use permisync::identity::rut;
use permisync::records::{Partition, MAX_DISPLAYED_WARNINGS};
use permisync::remote::HttpRemoteClient;
use permisync::sync::{default_date_comparator, FetchOutcome, SyncOrchestrator};
use std::process;
use std::sync::Arc;

/// Permisync - sync leave and permit records against the remote sheet
#[derive(Parser, Debug)]
#[command(name = "permisync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/permisync/config.yaml)
    #[arg(short, long)]
    config: Option<String>,

    /// Work offline (serve reads from the local backup)
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file
    Init,

    /// Fetch both partitions and the employee roster
    Fetch,

    /// Push the locally cached dataset back to the remote
    Push,

    /// Show per-partition sync status
    Status,

    /// Validate and format a national identity number
    CheckId {
        /// Identity to check (any formatting)
        rut: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    match &cli.config {
        Some(path) => Ok(SyncConfig::load(path)?),
        None => Ok(SyncConfig::load_default()?),
    }
}

fn build_orchestrator(config: SyncConfig) -> anyhow::Result<SyncOrchestrator> {
    let backup = BackupStore::open(&BackupConfig {
        path: config.backup_path.clone(),
    })?;
    let api = Arc::new(HttpRemoteClient::new(config.clone()));

    Ok(SyncOrchestrator::with_options(
        config,
        api,
        Some(backup),
        Arc::new(default_date_comparator),
    ))
}

fn print_warnings(warnings: &[permisync::records::ParseWarning]) {
    for warning in warnings.iter().take(MAX_DISPLAYED_WARNINGS) {
        println!("  warning ({}): {}", warning.row, warning.message);
    }
    if warnings.len() > MAX_DISPLAYED_WARNINGS {
        println!(
            "  ... and {} more warnings",
            warnings.len() - MAX_DISPLAYED_WARNINGS
        );
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init => {
            let path = SyncConfig::default_path();
            if path.exists() {
                println!("Config already exists at {}", path.display());
                return Ok(());
            }
            SyncConfig::default().save(&path)?;
            println!("Wrote default config to {}", path.display());
            Ok(())
        }

        Commands::CheckId { rut: raw } => {
            match rut::canonicalize(&raw) {
                Some(canonical) if rut::validate_checksum(&raw) => {
                    println!("valid: {}", rut::format_for_display(&canonical));
                }
                Some(canonical) => {
                    println!("invalid check digit: {}", rut::format_for_display(&canonical));
                    process::exit(1);
                }
                None => {
                    println!("malformed identity: {}", raw);
                    process::exit(1);
                }
            }
            Ok(())
        }

        Commands::Fetch => {
            let config = load_config(&cli)?;
            let orchestrator = build_orchestrator(config)?;
            orchestrator.set_online(!cli.offline);

            match orchestrator.fetch_records().await? {
                FetchOutcome::Remote { warnings } => {
                    println!("Fetched {} records", orchestrator.records().len());
                    print_warnings(&warnings);
                }
                FetchOutcome::Degraded { last_backup } => {
                    println!(
                        "Remote unavailable; serving {} records from backup{}",
                        orchestrator.records().len(),
                        last_backup
                            .map(|t| format!(" (last backup {})", t.to_rfc3339()))
                            .unwrap_or_default()
                    );
                }
                FetchOutcome::Superseded => {}
            }

            if let FetchOutcome::Remote { warnings } = orchestrator.fetch_employees().await? {
                println!("Fetched {} employees", orchestrator.employees().len());
                print_warnings(&warnings);
            }
            Ok(())
        }

        Commands::Push => {
            let config = load_config(&cli)?;
            let orchestrator = build_orchestrator(config)?;

            // The push payload is the last-known-good local dataset
            orchestrator.set_online(false);
            match orchestrator.fetch_records().await {
                Ok(_) => {}
                Err(permisync::PermisyncError::NoLocalData) => {
                    println!("Nothing to push; run fetch first");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }

            orchestrator.set_online(true);
            orchestrator.push_records().await?;
            println!("Pushed {} records", orchestrator.records().len());
            Ok(())
        }

        Commands::Status => {
            let config = load_config(&cli)?;
            let orchestrator = build_orchestrator(config)?;
            orchestrator.set_online(!cli.offline);
            let _ = orchestrator.fetch_records().await;

            for partition in Partition::ALL {
                let status = orchestrator.status(partition);
                println!(
                    "{}: {:?}{}{}",
                    partition,
                    status.state,
                    status
                        .last_success
                        .map(|t| format!(", last success {}", t.to_rfc3339()))
                        .unwrap_or_default(),
                    status
                        .last_error
                        .map(|e| format!(", last error: {}", e))
                        .unwrap_or_default(),
                );
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = permisync::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
