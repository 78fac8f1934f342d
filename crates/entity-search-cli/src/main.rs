//! `entity-search` CLI binary (spec §6 "CLI surface (thin collaborator)"):
//! `upgrade`, `reset`, `index-entities`, and `settings`/`version` printing.
//! Grounded on `original_source/openaleph_search/cli.py`'s four-command
//! surface and the teacher's `tracing-subscriber` init convention.

mod error;
mod export_entities;
mod index_entities;
mod upgrade;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use entity_search_client::ConnectionPool;
use entity_search_core::config::Settings;
use entity_search_core::model::SchemaRegistry;
use entity_search_core::nameanalysis::DefaultNameAnalysis;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::error::CliResult;
use crate::export_entities::run_export_entities;

#[derive(Parser)]
#[command(name = "entity-search", version, about = "Entity search index management and ingest")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or reconcile every bucket's mapping/settings (spec §4.1/§6).
    Upgrade,
    /// Drop every known index for this prefix, then `upgrade` (spec §6).
    Reset,
    /// Stream newline-delimited JSON entities into a dataset (spec §4.4/§6).
    #[command(name = "index-entities")]
    IndexEntities {
        #[arg(short = 'd', long)]
        dataset: String,
        /// Input path, or `-`/omitted for stdin.
        #[arg(short = 'i', long)]
        input: Option<String>,
        /// Relax refresh/replicas/translog durability across every bucket
        /// index for the duration of this run (spec §4.4), restoring the
        /// prior settings once ingest completes.
        #[arg(long)]
        bulk_mode: bool,
    },
    /// Print the effective configuration (spec §6 "settings ... printing").
    Settings,
    /// Scroll every bucket index for a dataset, emitting NDJSON (SPEC_FULL §2).
    #[command(name = "export-entities")]
    ExportEntities {
        #[arg(short = 'd', long)]
        dataset: String,
        /// Output path, or `-`/omitted for stdout.
        #[arg(short = 'o', long)]
        output: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn dispatch(cli: Cli, settings: Settings) -> CliResult<u8> {
    let registry = SchemaRegistry::bundled();

    match cli.command {
        Command::Settings => {
            println!("{settings:#?}");
            Ok(0)
        }
        Command::Upgrade => {
            let pool = ConnectionPool::connect(&settings).await?;
            upgrade::run_upgrade(pool.ingest(), &settings, &registry).await?;
            info!("upgrade complete");
            Ok(0)
        }
        Command::Reset => {
            let pool = ConnectionPool::connect(&settings).await?;
            upgrade::run_reset(pool.ingest(), &settings, &registry).await?;
            info!("reset complete");
            Ok(0)
        }
        Command::IndexEntities { dataset, input, bulk_mode } => {
            let pool = ConnectionPool::connect(&settings).await?;
            let name_analysis = DefaultNameAnalysis;
            let report = index_entities::run_index_entities(pool.ingest(), &settings, &registry, &name_analysis, &dataset, input.as_deref(), bulk_mode).await?;
            info!(success = report.success, failed = report.failed, duration_ms = report.duration.as_millis(), throughput = report.throughput(), "index-entities complete");
            Ok(u8::from(report.failed > 0))
        }
        Command::ExportEntities { dataset, output } => {
            let pool = ConnectionPool::connect(&settings).await?;
            let count = run_export_entities(pool.search(), &settings, &registry, &dataset, output.as_deref()).await?;
            info!(dataset, exported = count, "export-entities complete");
            Ok(0)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    match dispatch(cli, settings).await {
        Ok(0) => ExitCode::from(0),
        Ok(_) => ExitCode::from(1),
        Err(err) => {
            error!(error = %err, "command failed");
            ExitCode::from(1)
        }
    }
}
