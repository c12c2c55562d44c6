//! Mirror a remote file tree into a search index.
//!
//! Crawls a copyparty-style directory listing, flattens the tree into search
//! documents, and replaces the contents of a Meilisearch index with them.

pub mod backend;
pub mod config;
pub mod crawler;
pub mod flatten;
pub mod listing;
pub mod models;
pub mod search;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use backend::{MeilisearchBackend, SearchBackend};
pub use config::{CrawlConfig, RetryPolicy, SyncConfig};
pub use crawler::{CrawlReport, SubtreeFailure, TreeCrawler};
pub use flatten::{FlattenOptions, flatten, flatten_under};
pub use listing::{HttpListingClient, ListingSource};
pub use models::{NodeKind, SearchDocument, TreeNode};
pub use search::{DocumentMatcher, IndexHandle};
pub use session::{SearchSession, SearchSessions};
pub use sync::{IndexSynchronizer, SyncDecision, SyncOutcome};

/// Settings for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct MirrorConfig {
    pub crawl: CrawlConfig,
    pub flatten: FlattenOptions,
    pub sync: SyncConfig,
}

/// What a pipeline run did.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: SyncOutcome,
    /// Subtrees that could not be listed. Their documents are missing from
    /// the index.
    pub crawl_failures: Vec<SubtreeFailure>,
    /// Documents produced by this run; empty when the sync was skipped.
    pub documents: Vec<SearchDocument>,
}

/// Run crawl → flatten → sync.
///
/// The backend is health-checked before any crawl work, and the crawl is
/// skipped entirely when the index is already populated.
pub async fn run_pipeline(
    listing: Arc<dyn ListingSource>,
    backend: Arc<dyn SearchBackend>,
    config: MirrorConfig,
) -> crate::error::Result<PipelineReport> {
    backend.health().await?;

    let synchronizer = IndexSynchronizer::new(backend, config.sync);
    if let SyncDecision::Skip { existing_documents } = synchronizer.check().await {
        tracing::info!(existing_documents, "index already populated, skipping crawl");
        return Ok(PipelineReport {
            outcome: SyncOutcome::Skipped { existing_documents },
            crawl_failures: Vec::new(),
            documents: Vec::new(),
        });
    }

    let crawler = TreeCrawler::new(listing, config.crawl);
    let report = crawler.crawl().await?;
    if !report.is_complete() {
        tracing::warn!(
            failed_subtrees = report.failures.len(),
            "crawl incomplete, indexing the partial tree"
        );
    }

    let documents = report.documents(&config.flatten);
    tracing::info!(documents = documents.len(), "flattened file tree");

    let outcome = synchronizer.rebuild(&documents).await?;

    Ok(PipelineReport {
        outcome,
        crawl_failures: report.failures,
        documents,
    })
}
