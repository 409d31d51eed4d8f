//! Command-line interface.

mod commands;
mod helpers;
mod runtime;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "frontier")]
#[command(about = "Discovery crawler and rendered-metrics scraper for community platforms")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides config file and FRONTIER_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// JSON file with identities (credential bundles) for browser sessions
    #[arg(long, global = true)]
    identities: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Expand the frontier until interrupted
    Run {
        /// Number of workers
        #[arg(short, long)]
        workers: Option<usize>,
        /// Targets claimed per worker iteration
        #[arg(short, long)]
        batch_size: Option<usize>,
        /// Minimum audience for newly discovered targets
        #[arg(long)]
        min_audience: Option<i64>,
        /// Seconds to wait when the queue is empty
        #[arg(long)]
        idle_wait: Option<u64>,
        /// Simultaneous author fetches per worker
        #[arg(long)]
        author_concurrency: Option<usize>,
    },

    /// Process the named targets once
    Batch {
        /// Target names (with or without the r/ prefix)
        #[arg(required = true)]
        targets: Vec<String>,
        /// Minimum audience for newly discovered targets
        #[arg(long)]
        min_audience: Option<i64>,
    },

    /// Add seed targets to the queue
    Seed {
        /// Target names to enqueue
        targets: Vec<String>,
        /// Enqueue search results for this query instead
        #[arg(long, conflicts_with = "targets")]
        search: Option<String>,
        /// Maximum search results considered
        #[arg(short, long, default_value = "100")]
        limit: usize,
        /// Skip the audience lookup used as the priority weight
        #[arg(long)]
        no_lookup: bool,
    },

    /// Show queue and record counts
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scrape rendered metrics for completed targets
    Intel {
        /// Targets per pass
        #[arg(short, long)]
        limit: Option<usize>,
        /// Simultaneous browser sessions
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Stop after one pass instead of draining all pending targets
        #[arg(long)]
        once: bool,
    },

    /// Move failed targets back to pending
    Requeue {
        /// Maximum entries to requeue (0 = all)
        #[arg(short, long, default_value = "0")]
        limit: usize,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        database: cli.database,
        identities_path: cli.identities,
    };
    let mut settings = load_settings(&options).await?;

    match cli.command {
        Commands::Run {
            workers,
            batch_size,
            min_audience,
            idle_wait,
            author_concurrency,
        } => {
            if let Some(workers) = workers {
                settings.orchestrator.workers = workers;
            }
            if let Some(batch_size) = batch_size {
                settings.orchestrator.batch_size = batch_size;
            }
            if let Some(min) = min_audience {
                settings.discovery.filter.min_audience = min;
            }
            if let Some(secs) = idle_wait {
                settings.orchestrator.idle_wait = std::time::Duration::from_secs(secs);
            }
            if let Some(n) = author_concurrency {
                settings.discovery.author_concurrency = n;
            }
            commands::cmd_run(settings).await
        }
        Commands::Batch {
            targets,
            min_audience,
        } => {
            if let Some(min) = min_audience {
                settings.discovery.filter.min_audience = min;
            }
            commands::cmd_batch(settings, &targets).await
        }
        Commands::Seed {
            targets,
            search,
            limit,
            no_lookup,
        } => commands::cmd_seed(settings, &targets, search.as_deref(), limit, !no_lookup).await,
        Commands::Stats { json } => commands::cmd_stats(settings, json).await,
        Commands::Intel {
            limit,
            concurrency,
            once,
        } => {
            if let Some(limit) = limit {
                settings.intel.limit = limit;
            }
            if let Some(concurrency) = concurrency {
                settings.intel.concurrency = concurrency;
            }
            commands::cmd_intel(settings, once).await
        }
        Commands::Requeue { limit } => commands::cmd_requeue(settings, limit).await,
    }
}
