//! Sumi-Sweep main entry point
//!
//! This is the command-line interface for the Sumi-Sweep batch fetcher.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_sweep::config::{load_config_with_hash, Config};
use sumi_sweep::engine::{pending_keys, policy_from_threshold, Orchestrator, RunOptions};
use sumi_sweep::fetch::{HttpFetcher, PageContent};
use sumi_sweep::input::load_items;
use sumi_sweep::output::{
    generate_markdown_summary, load_statistics, open_sink, print_statistics, StateStatistics,
};
use sumi_sweep::storage::{legacy, JsonStateStore, StateStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Sweep: a resumable batch content fetcher
///
/// Sumi-Sweep fetches every URL in an item list with bounded concurrency,
/// retries transient failures with backoff, and records per-item progress
/// so an interrupted run picks up only the unfinished items.
#[derive(Parser, Debug)]
#[command(name = "sumi-sweep")]
#[command(version)]
#[command(about = "A resumable batch content fetcher", long_about = None)]
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

    /// Start a fresh run, setting aside previous state
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be processed without fetching
    #[arg(long, conflicts_with_all = ["stats", "export_summary", "import_legacy"])]
    dry_run: bool,

    /// Show statistics from the state file and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary", "import_legacy"])]
    stats: bool,

    /// Write a markdown summary of the state file and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats", "import_legacy"])]
    export_summary: Option<PathBuf>,

    /// Convert an old progress file into the current state format and exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats", "export_summary"])]
    import_legacy: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let state_path = PathBuf::from(&config.output.state_path);
    let store = JsonStateStore::new(&state_path)
        .with_context(|| format!("Failed to open state file {}", state_path.display()))?
        .with_config_hash(config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &store)
    } else if cli.stats {
        handle_stats(&store)
    } else if let Some(path) = &cli.export_summary {
        handle_export_summary(&store, path)
    } else if let Some(path) = &cli.import_legacy {
        handle_import_legacy(&store, path, cli.fresh)
    } else {
        handle_run(config, store, cli.fresh).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_sweep=info,warn"),
            1 => EnvFilter::new("sumi_sweep=debug,info"),
            2 => EnvFilter::new("sumi_sweep=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the pending set
fn handle_dry_run(config: &Config, store: &JsonStateStore) -> anyhow::Result<()> {
    println!("=== Sumi-Sweep Dry Run ===\n");

    println!("Runner Configuration:");
    println!("  Concurrency: {}", config.runner.concurrency);
    println!("  Attempts per run: {}", config.runner.max_attempts);
    match config.runner.permanent_after {
        Some(limit) => println!("  Permanent after: {} attempts", limit),
        None => println!("  Permanent after: never"),
    }
    println!("  Retry gating: {:?}", config.runner.retry_gating);

    println!("\nBackoff:");
    println!("  Kind: {:?}", config.backoff.kind);
    println!("  Base: {}ms", config.backoff.base_ms);
    println!("  Cap: {}ms", config.backoff.cap_ms);

    println!("\nFetch:");
    println!("  User agent: {}", config.fetch.user_agent);
    println!("  Timeout: {}s", config.fetch.timeout_secs);
    println!("  Fields ({}):", config.fetch.fields.len());
    for field in &config.fetch.fields {
        let marker = if field.required { "required" } else { "optional" };
        println!("    - {} = {} ({})", field.name, field.selector, marker);
    }

    println!("\nOutput:");
    println!("  State: {}", config.output.state_path);
    println!(
        "  Results: {} ({:?})",
        config.output.results_path, config.output.results
    );

    let keys = load_items(Path::new(&config.input.items_path))
        .with_context(|| format!("Failed to load items from {}", config.input.items_path))?;
    let items = store.load_or_reset()?;
    let pending = pending_keys(&keys, &items, &RunOptions::from_config(config), Utc::now());

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would process {} of {} items ({} already recorded)",
        pending.len(),
        keys.len(),
        items.len()
    );
    for key in pending.iter().take(20) {
        println!("    * {}", key);
    }
    if pending.len() > 20 {
        println!("    ... and {} more", pending.len() - 20);
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the state file
fn handle_stats(store: &JsonStateStore) -> anyhow::Result<()> {
    println!("State file: {}\n", store.path().display());

    let stats = load_statistics(store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: generates a markdown summary
fn handle_export_summary(store: &JsonStateStore, output: &Path) -> anyhow::Result<()> {
    println!("=== Exporting Summary ===\n");
    println!("State file: {}", store.path().display());
    println!("Output: {}", output.display());
    println!();

    let stats = load_statistics(store)?;
    generate_markdown_summary(&stats, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✓ Summary exported to: {}", output.display());

    Ok(())
}

/// Handles --import-legacy: converts an old progress file into a snapshot
fn handle_import_legacy(store: &JsonStateStore, source: &Path, fresh: bool) -> anyhow::Result<()> {
    if store.path().exists() && !fresh {
        bail!(
            "State file {} already exists; pass --fresh to replace it",
            store.path().display()
        );
    }

    let items = legacy::import_legacy(source)
        .with_context(|| format!("Failed to import {}", source.display()))?;
    store.save_all(&items)?;

    let stats = StateStatistics::from_items(&items, store.meta());
    println!(
        "✓ Imported {} items ({} completed) into {}",
        stats.counts.total,
        stats.counts.completed,
        store.path().display()
    );

    Ok(())
}

/// Handles the main run
async fn handle_run(config: Config, store: JsonStateStore, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        set_aside_state(store.path())?;
        tracing::info!("Starting fresh run (ignoring previous state)");
    } else {
        tracing::info!("Starting run (will resume from existing state)");
    }

    let keys = load_items(Path::new(&config.input.items_path))
        .with_context(|| format!("Failed to load items from {}", config.input.items_path))?;
    tracing::info!("Loaded {} items", keys.len());

    let performer = Arc::new(HttpFetcher::new(&config.fetch)?);
    let sink = open_sink::<PageContent>(&config.output)?;
    let orchestrator = Orchestrator::new(
        Arc::new(store),
        performer,
        sink,
        RunOptions::from_config(&config),
    )
    .with_failure_policy(policy_from_threshold(config.runner.permanent_after));

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    match orchestrator.run(&keys, &cancel).await {
        Ok(summary) => {
            println!(
                "✓ Completed {}, failed {}, permanently failed {}, interrupted {}",
                summary.completed, summary.failed, summary.permanently_failed, summary.interrupted
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}

/// Moves an existing state file to `<name>.bak`
fn set_aside_state(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    std::fs::rename(path, &backup)
        .with_context(|| format!("Failed to move aside {}", path.display()))?;
    tracing::info!("Previous state moved to {}", PathBuf::from(backup).display());
    Ok(())
}

/// Cancels `token` on Ctrl-C; repeated signals are ignored
fn spawn_shutdown_listener(token: CancellationToken) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Unable to listen for Ctrl-C");
                return;
            }
            if token.is_cancelled() {
                tracing::info!("Shutdown already in progress");
            } else {
                tracing::info!("Shutdown requested, finishing in-flight items");
                token.cancel();
            }
        }
    });
}
