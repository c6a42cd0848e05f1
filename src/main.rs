//! Review Harvester main entry point
//!
//! This is the command-line interface for the review harvester.

use anyhow::Context;
use clap::Parser;
use review_harvester::config::{load_config_with_hash, Config};
use review_harvester::crawler::Harvester;
use review_harvester::output::{load_statistics, print_statistics};
use review_harvester::storage::{open_storage, QueueStore};
use review_harvester::url::render_unit_url;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Review Harvester: a polite review crawler
///
/// Works through a catalog of (group, subject) pairs on every configured
/// origin, staying under a global hourly request ceiling and backing off
/// when a site starts blocking. Progress survives restarts.
#[derive(Parser, Debug)]
#[command(name = "review-harvester")]
#[command(version = "1.0.0")]
#[command(about = "A politeness-aware review crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Rebuild the queue from the catalog, discarding progress
    #[arg(long, conflicts_with_all = ["reset", "stats", "dry_run"])]
    fresh: bool,

    /// Re-queue every unit as pending and exit
    #[arg(long, conflicts_with_all = ["stats", "dry_run"])]
    reset: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and show what would be harvested without fetching
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.reset {
        handle_reset(&config)
    } else {
        handle_harvest(config, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("review_harvester=info,warn"),
            1 => EnvFilter::new("review_harvester=debug,info"),
            2 => EnvFilter::new("review_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be harvested
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let harvester = &config.harvester;
    println!("=== Review Harvester Dry Run ===\n");

    println!("Scheduler:");
    println!("  Workers: {}", harvester.worker_count);
    println!(
        "  Politeness delay: {:.1}-{:.1}s (x{} between {}:00 and {}:00)",
        harvester.min_delay_seconds,
        harvester.max_delay_seconds,
        harvester.night_mode_multiplier,
        harvester.night_hours_start,
        harvester.night_hours_end
    );
    println!("  Requests per hour: {}", harvester.requests_per_hour);
    println!("  Batch size: {}", harvester.batch_size);
    println!(
        "  Checkpoint every {} units",
        harvester.checkpoint_interval_units
    );
    println!("  Max pages per unit: {}", harvester.max_pages_per_unit);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    let items = config.catalog_items();
    println!("\nOrigins ({}):", config.origins.len());
    for origin in &config.origins {
        println!(
            "  - {} ({}, priority {})",
            origin.name, origin.kind, origin.priority
        );
        if let Some(item) = items.iter().find(|item| item.key.origin == origin.name) {
            let url = render_unit_url(&origin.url_template, &item.key, 1)?;
            println!("    * first URL: {}", url);
        }
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would harvest {} units ({} catalog subjects x {} origins)",
        items.len(),
        config.catalog.iter().map(|c| c.subjects.len()).sum::<usize>(),
        config.origins.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --reset mode: re-queues every unit
fn handle_reset(config: &Config) -> anyhow::Result<()> {
    let mut storage = open_storage(Path::new(&config.output.database_path))?;
    let count = storage.reset_all_units()?;
    println!("✓ Re-queued {} units as pending", count);
    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh harvest (discarding previous progress)");
    } else {
        tracing::info!("Starting harvest (resumes previous progress)");
    }

    tracing::info!(
        "Origins: {}, catalog groups: {}, workers: {}",
        config.origins.len(),
        config.catalog.len(),
        config.harvester.worker_count
    );

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let harvester = Harvester::new(config, storage)?.fresh(fresh);

    let stop = harvester.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after in-flight work");
            stop.cancel();
        }
    });

    match harvester.run().await {
        Ok(summary) => {
            tracing::info!(
                "Units: {} completed, {} pending, {} processing; {} records saved, {} duplicates skipped",
                summary.completed,
                summary.pending,
                summary.processing,
                summary.records_saved,
                summary.duplicates_skipped
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
