//! copysearch binary: sync a file server into Meilisearch, or query the index.

use copysearch::config::Config;
use copysearch::mirror::{
    self, HttpListingClient, IndexHandle, MeilisearchBackend, NodeKind, SyncOutcome,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "copysearch", version, about = "Mirror a file server into a search index")]
struct Cli {
    /// Path to config file (defaults to the platform config directory).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl the file server and rebuild the index if needed.
    Sync {
        /// Rebuild even if the index is already populated.
        #[arg(long)]
        force: bool,
    },
    /// Search the synchronized index.
    Search {
        query: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config, cli.debug);

    match cli.command {
        Command::Sync { force } => {
            config.search.force_reindex |= force;
            run_sync(&config).await
        }
        Command::Search { query, limit } => run_search(&config, &query, limit).await,
    }
}

fn init_tracing(config: &Config, debug: bool) {
    let default_level = if debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.logging.ansi)
        .with_target(false)
        .init();
}

fn backend(config: &Config) -> anyhow::Result<Arc<MeilisearchBackend>> {
    let host = config
        .search
        .host
        .clone()
        .context("search.host is not configured")?;
    let backend = MeilisearchBackend::new(
        host,
        config.search.api_key.clone(),
        config.search.index.clone(),
        Duration::from_secs(config.search.request_timeout_secs),
    )?;
    Ok(Arc::new(backend))
}

async fn run_sync(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    let root_url = config
        .listing
        .root_url
        .clone()
        .context("listing.root_url is not configured")?;
    let listing = HttpListingClient::new(
        root_url,
        config.listing.password.clone(),
        Duration::from_secs(config.listing.request_timeout_secs),
    )?;

    let report = mirror::run_pipeline(Arc::new(listing), backend(config)?, config.mirror())
        .await
        .context("sync failed")?;

    for failure in &report.crawl_failures {
        tracing::warn!(path = %failure.path, error = %failure.error, "subtree missing from index");
    }

    match report.outcome {
        SyncOutcome::Skipped { existing_documents } => {
            tracing::info!(existing_documents, "index up to date, nothing to do");
        }
        SyncOutcome::Indexed { documents, batches } => {
            tracing::info!(
                documents,
                batches,
                failed_subtrees = report.crawl_failures.len(),
                "sync finished"
            );
        }
    }

    Ok(())
}

async fn run_search(config: &Config, query: &str, limit: usize) -> anyhow::Result<()> {
    let index = IndexHandle::new(backend(config)?);
    let hits = index.search(query, limit).await.context("search failed")?;

    if hits.is_empty() {
        println!("No results for \"{query}\".");
        return Ok(());
    }

    for (position, hit) in hits.iter().enumerate() {
        let marker = match hit.kind {
            NodeKind::Directory => "dir ",
            NodeKind::File => "file",
        };
        println!("{:>2}. [{marker}] {}", position + 1, hit.display_name());
        println!("    open:     {}", hit.open_url());
        println!("    download: {}", hit.download_url());
    }

    Ok(())
}
