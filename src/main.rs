//! Tidepool main entry point
//!
//! This is the command-line interface for running one crawl session.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tidepool::config::{load_config_with_hash, Config};
use tidepool::crawler::{CrawlController, HttpWorker, Page, PageVisitor};
use tidepool::output::CrawlSummary;
use tracing_subscriber::EnvFilter;

/// Tidepool: a resumable, polite multi-worker web crawler
///
/// Tidepool crawls from the configured seeds with a pool of workers,
/// respecting robots.txt and a politeness delay, and stops on its own once
/// the frontier runs dry. Interrupted crawls resume when resumable crawling
/// is enabled.
#[derive(Parser, Debug)]
#[command(name = "tidepool")]
#[command(version)]
#[command(about = "A resumable, polite multi-worker web crawler", long_about = None)]
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

    /// Start a fresh crawl, discarding any previous crawl state
    #[arg(long)]
    fresh: bool,

    /// Number of workers (overrides number-of-crawlers)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,
}

/// Visitor that logs every page it sees
#[derive(Debug, Default)]
struct LoggingVisitor;

impl PageVisitor for LoggingVisitor {
    fn visit(&self, page: &Page) {
        tracing::info!(
            "Visited {} [{}] {}",
            page.url.as_str(),
            page.status_code,
            page.title.as_deref().unwrap_or("")
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.fresh {
        config.crawler.resumable_crawling = false;
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    }
    if let Some(workers) = cli.workers {
        config.crawler.number_of_crawlers = workers;
    }

    let summary = run_session(config).await?;
    println!("{}", summary);

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidepool=info,warn"),
            1 => EnvFilter::new("tidepool=debug,info"),
            2 => EnvFilter::new("tidepool=trace,debug"),
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

/// Seeds the session, runs it to completion and summarizes it
async fn run_session(config: Config) -> anyhow::Result<CrawlSummary> {
    let started = Instant::now();
    let workers = config.crawler.number_of_crawlers;
    let seen_urls = config.seen_urls.clone();
    let seeds = config.seeds.clone();

    let controller = Arc::new(
        CrawlController::<HttpWorker<LoggingVisitor>>::new(config)
            .context("Failed to open the crawl session")?,
    );

    for seen in &seen_urls {
        controller.add_seen_url(&seen.url, seen.doc_id)?;
    }
    for seed in &seeds {
        if let Err(e) = controller.add_seed(&seed.url, seed.doc_id, 0).await {
            tracing::warn!("Skipping seed {}: {}", seed.url, e);
        }
    }
    tracing::info!("Added {} seed URLs", seeds.len());

    {
        let controller = controller.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, shutting down the crawl");
                controller.shutdown();
            }
        });
    }

    controller.start_default(workers, true).await?;

    let frontier = controller.session().frontier();
    let scheduled = frontier.scheduled_count().unwrap_or_default();
    let processed = frontier.processed_count().unwrap_or_default();

    Ok(
        CrawlSummary::from_workers(&controller.take_crawlers_local_data(), scheduled, processed)
            .with_elapsed(started.elapsed()),
    )
}
