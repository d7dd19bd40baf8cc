//! # Snapshot Viewer CLI
//!
//! Inspects persisted tracer snapshots without a running engine.
//!
//! Usage:
//!   snapshot_viewer summary
//!   snapshot_viewer top [--limit N]
//!   snapshot_viewer history [--hours H] [--tier HIGH]
//!   snapshot_viewer export --format csv [--hours H]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracer::config::StorageConfig;
use tracer::storage::{ExportFormat, ResultStore, SnapshotFile};
use tracer::{AnalysisResult, SeverityTier};

#[derive(Parser)]
#[command(name = "snapshot_viewer")]
#[command(about = "Inspect and export lag tracer snapshots", long_about = None)]
struct Cli {
    /// Snapshot directory
    #[arg(short, long, default_value = "./var/tracer")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show snapshot headers and store statistics
    Summary,

    /// Show the highest scoring cached cells
    Top {
        /// Maximum number of cells to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show history records
    History {
        /// Only records from the last N hours
        #[arg(long, default_value_t = 24)]
        hours: u64,

        /// Minimum tier (LOW, MEDIUM, HIGH, CRITICAL)
        #[arg(short, long)]
        tier: Option<String>,

        /// Maximum records to show
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Export history to the exports directory
    Export {
        /// Output format: json or csv
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Only records from the last N hours
        #[arg(long, default_value_t = 24)]
        hours: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let config = StorageConfig {
        data_dir: cli.dir.clone(),
        ..StorageConfig::default()
    };

    match cli.command {
        Commands::Summary => {
            println!("Snapshots in {}\n", cli.dir.display());
            for file in [
                SnapshotFile::new(config.cache_snapshot_path(), "cache"),
                SnapshotFile::new(config.history_snapshot_path(), "history"),
            ] {
                match file.read_header()? {
                    Some(header) => println!(
                        "{:<8} v{} | {} entries | {} bytes | written at {}",
                        header.kind, header.version, header.entries, header.payload_len, header.written_at
                    ),
                    None => println!("{:<8} (missing)", file.kind()),
                }
            }

            let store = load_store(config)?;
            println!();
            println!("{}", store.stats());

            let history = store.history_since(u64::MAX);
            for tier in SeverityTier::ALL.iter().rev() {
                let count = history.iter().filter(|r| r.tier() == *tier).count();
                println!("  {:<9} {}", tier.as_str(), count);
            }
        }

        Commands::Top { limit } => {
            let store = load_store(config)?;
            let worst = store.worst(limit);
            if worst.is_empty() {
                println!("No cached results");
            }
            for (rank, result) in worst.iter().enumerate() {
                println!("{:>3}. {}", rank + 1, result.summary());
                println!("     {}", result.tier().recommended_action());
            }
        }

        Commands::History { hours, tier, limit } => {
            let min_tier = tier
                .map(|t| t.parse::<SeverityTier>())
                .transpose()?
                .unwrap_or(SeverityTier::Low);

            let store = load_store(config)?;
            let records: Vec<_> = store
                .history_since(hours.saturating_mul(60 * 60 * 1000))
                .into_iter()
                .filter(|r| r.tier() >= min_tier)
                .collect();

            println!(
                "{} records in the last {}h at {} or above\n",
                records.len(),
                hours,
                min_tier
            );
            for result in records.iter().rev().take(limit) {
                print_result(result);
            }
        }

        Commands::Export { format, hours } => {
            let format: ExportFormat = format.parse()?;
            let store = load_store(config)?;
            let path = store.export(format, hours)?;
            println!("Exported to {}", path.display());
        }
    }

    Ok(())
}

fn load_store(config: StorageConfig) -> Result<ResultStore, Box<dyn std::error::Error>> {
    let store = ResultStore::new(config);
    store.try_restore()?;
    Ok(store)
}

fn print_result(result: &AnalysisResult) {
    println!("     {}", result.summary());
    for factor in result.factors() {
        println!("       - {}", factor);
    }
}
