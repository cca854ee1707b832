//! Tidewatch main entry point
//!
//! This is the command-line interface for the Tidewatch listing tracker.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tidewatch::archive::Archiver;
use tidewatch::config::{load_config_with_hash, validate, Config};
use tidewatch::drivers::DriverRegistry;
use tidewatch::seed::SeedDocument;
use tidewatch::storage::{open_storage, shared, with_storage, SharedStorage};
use tidewatch::{ExplorationEngine, ExtractionEngine, FetchClient};
use tracing_subscriber::EnvFilter;

/// Tidewatch: discovers listings and tracks how they change
#[derive(Parser, Debug)]
#[command(name = "tidewatch")]
#[command(version)]
#[command(about = "Discovers listings and tracks how they change", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level; RUST_LOG takes precedence when set
    #[arg(
        long = "log-level",
        visible_alias = "logLevel",
        global = true,
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error", "off"]
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an explorer to discover new items
    Explore {
        /// Explorer to run, as <network>:<explorer>
        #[arg(long, value_name = "NETWORK:KEY")]
        explorer: String,
    },

    /// Re-fetch and extract the items selected by a filter
    Extract {
        /// Filter to process, as <network>:<filter>
        #[arg(long, value_name = "NETWORK:KEY")]
        filter: String,
    },

    /// List the stored filters
    Filters,

    /// Upsert networks, explorers and filters from a seed file
    Seed {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level);

    let config = load_configuration(cli.config.as_deref())?;
    let storage = open_shared_storage(&config)?;

    match cli.command {
        Command::Explore { explorer } => {
            let engine = ExplorationEngine::new(
                storage,
                FetchClient::new(&config.http)?,
                Arc::new(DriverRegistry::builtin()),
                config.exploration.clone(),
            );
            let result = engine.explore(&explorer).await?;
            println!("Explorer {} completed: {:?}", explorer, result.stats);
        }
        Command::Extract { filter } => {
            let engine = ExtractionEngine::new(
                storage,
                FetchClient::new(&config.http)?,
                Arc::new(DriverRegistry::builtin()),
                Archiver::new(config.storage.data_dir()),
                config.extraction.clone(),
            );
            let stats = engine.extract(&filter).await?;
            println!("Extraction {} completed: {:?}", filter, stats.snapshot());
        }
        Command::Filters => handle_filters(&storage)?,
        Command::Seed { file } => {
            let seed = SeedDocument::load(&file)
                .with_context(|| format!("Failed to load seed {}", file.display()))?;
            let summary = seed.apply(&storage)?;
            println!(
                "Seeded {} networks, {} explorers, {} filters",
                summary.networks, summary.explorers, summary.filters
            );
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber from the requested level
fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        "off" => EnvFilter::new("off"),
        level => EnvFilter::new(format!("tidewatch={},warn", level)),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::debug!("No configuration file given, using defaults");
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    };

    tracing::info!("Loading configuration from: {}", path.display());
    match load_config_with_hash(path) {
        Ok((config, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            Ok(config)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            Err(e.into())
        }
    }
}

fn open_shared_storage(config: &Config) -> anyhow::Result<SharedStorage> {
    let path = Path::new(&config.storage.database_path);
    let storage = open_storage(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    Ok(shared(storage))
}

/// Prints every stored filter as `network:key<TAB>description`
fn handle_filters(storage: &SharedStorage) -> anyhow::Result<()> {
    let filters = with_storage(storage, |s| s.list_filters())?;

    println!("Available filters [{}]", filters.len());
    for filter in filters {
        println!(
            "{}:{}\t{}",
            filter.network_key,
            filter.key,
            filter.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
