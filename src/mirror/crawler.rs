//! Recursive crawler for the remote directory listing.
//!
//! Every directory's listing is fetched through one shared semaphore, so the
//! number of requests in flight is bounded across the whole crawl rather than
//! per level. Failed fetches are retried with exponential backoff; a directory
//! that keeps failing is kept in the tree with no children and reported in
//! [`CrawlReport::failures`].

use crate::error::{CrawlError, Result};
use crate::mirror::config::CrawlConfig;
use crate::mirror::flatten::{FlattenOptions, compose_path, flatten_under};
use crate::mirror::listing::{ListingResponse, ListingSource};
use crate::mirror::models::{NodeKind, SearchDocument, TreeNode};

use futures::future::{BoxFuture, FutureExt, join_all};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Result of a crawl: the populated forest plus any subtrees that could not
/// be listed.
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Listing path the forest was crawled from, e.g. `/music/`.
    pub root: String,
    pub forest: Vec<TreeNode>,
    pub failures: Vec<SubtreeFailure>,
}

impl CrawlReport {
    /// Total number of nodes in the forest.
    pub fn node_count(&self) -> usize {
        self.forest.iter().map(TreeNode::subtree_len).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Flatten the forest with paths composed from the server root.
    pub fn documents(&self, options: &FlattenOptions) -> Vec<SearchDocument> {
        flatten_under(&self.forest, &self.root, options)
    }
}

/// A directory whose listing failed permanently.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtreeFailure {
    /// Listing path of the directory.
    pub path: String,
    pub error: String,
}

struct FetchFailure {
    attempts: u32,
    error: CrawlError,
}

/// Crawls a listing source into a [`TreeNode`] forest.
pub struct TreeCrawler {
    source: Arc<dyn ListingSource>,
    gate: Arc<Semaphore>,
    config: CrawlConfig,
}

impl TreeCrawler {
    pub fn new(source: Arc<dyn ListingSource>, config: CrawlConfig) -> Self {
        let permits = config.concurrency.max(1);
        Self {
            source,
            gate: Arc::new(Semaphore::new(permits)),
            config,
        }
    }

    /// Crawl the tree below the configured path prefix.
    ///
    /// Fails only when the root listing cannot be retrieved.
    pub async fn crawl(&self) -> Result<CrawlReport> {
        let root = normalize_prefix(&self.config.path_prefix);
        tracing::info!(root = %root, concurrency = self.config.concurrency, "starting crawl");

        let listing = self.fetch_with_retry(&root).await.map_err(|failure| {
            CrawlError::RootUnavailable {
                path: root.clone(),
                attempts: failure.attempts,
                last_error: failure.error.to_string(),
            }
        })?;

        let nodes = listing.into_nodes(&root);
        let forest = join_all(nodes.into_iter().map(|node| self.populate(node, &root))).await;

        let mut failures = Vec::new();
        collect_failures(&forest, &root, &mut failures);

        let report = CrawlReport {
            root,
            forest,
            failures,
        };
        tracing::info!(
            nodes = report.node_count(),
            failed_subtrees = report.failures.len(),
            "crawl complete"
        );

        Ok(report)
    }

    /// Fetch and attach the children of `node` if it is a directory, then
    /// recurse into its child directories.
    fn populate<'a>(&'a self, mut node: TreeNode, parent: &'a str) -> BoxFuture<'a, TreeNode> {
        async move {
            if node.kind != NodeKind::Directory {
                return node;
            }

            let path = compose_path(parent, &node.href, NodeKind::Directory);
            match self.fetch_with_retry(&path).await {
                Ok(listing) => {
                    let children = listing.into_nodes(&path);
                    node.children =
                        join_all(children.into_iter().map(|child| self.populate(child, &path)))
                            .await;
                }
                Err(failure) => {
                    tracing::warn!(
                        path = %path,
                        attempts = failure.attempts,
                        error = %failure.error,
                        "giving up on directory listing"
                    );
                    node.listing_error = Some(failure.error.to_string());
                }
            }

            node
        }
        .boxed()
    }

    async fn fetch_with_retry(&self, path: &str) -> std::result::Result<ListingResponse, FetchFailure> {
        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let result = self.fetch_once(path).await;

            match result {
                Ok(listing) => {
                    if attempts > 1 {
                        tracing::info!(path, attempts, "listing fetch recovered");
                    }
                    return Ok(listing);
                }
                Err(error) if attempts < max_attempts => {
                    let delay = self.config.retry.delay(attempts);
                    tracing::warn!(
                        path,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "listing fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(FetchFailure { attempts, error }),
            }
        }
    }

    /// One request under an admission permit. The permit is released before
    /// any backoff sleep.
    async fn fetch_once(&self, path: &str) -> std::result::Result<ListingResponse, CrawlError> {
        let _permit = self.gate.acquire().await.map_err(|error| CrawlError::Request {
            path: path.to_string(),
            message: error.to_string(),
        })?;

        match tokio::time::timeout(self.config.request_timeout, self.source.fetch(path)).await {
            Ok(result) => result,
            Err(_) => Err(CrawlError::Timeout {
                path: path.to_string(),
            }),
        }
    }
}

/// `music` → `/music/`, `` → `/`.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

fn collect_failures(nodes: &[TreeNode], parent: &str, failures: &mut Vec<SubtreeFailure>) {
    for node in nodes.iter().filter(|n| n.is_dir()) {
        let path = compose_path(parent, &node.href, NodeKind::Directory);
        if let Some(error) = &node.listing_error {
            failures.push(SubtreeFailure {
                path: path.clone(),
                error: error.clone(),
            });
        }
        collect_failures(&node.children, &path, failures);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::config::RetryPolicy;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory listing source keyed by path. Paths in `fail_times` fail that
    /// many times before answering.
    #[derive(Default)]
    struct FakeListing {
        listings: HashMap<String, Value>,
        fail_times: Mutex<HashMap<String, usize>>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Option<Duration>,
    }

    impl FakeListing {
        fn with(mut self, path: &str, listing: Value) -> Self {
            self.listings.insert(path.to_string(), listing);
            self
        }

        fn failing(self, path: &str, times: usize) -> Self {
            self.fail_times.lock().insert(path.to_string(), times);
            self
        }

        fn calls_for(&self, path: &str) -> usize {
            self.calls.lock().iter().filter(|p| *p == path).count()
        }
    }

    #[async_trait]
    impl ListingSource for FakeListing {
        async fn fetch(&self, path: &str) -> std::result::Result<ListingResponse, CrawlError> {
            self.calls.lock().push(path.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            {
                let mut fail_times = self.fail_times.lock();
                if let Some(remaining) = fail_times.get_mut(path) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(CrawlError::Status {
                            path: path.to_string(),
                            status: 503,
                        });
                    }
                }
            }

            let listing = self
                .listings
                .get(path)
                .cloned()
                .unwrap_or_else(|| json!({"dirs": [], "files": []}));
            serde_json::from_value(listing).map_err(|e| CrawlError::Parse {
                path: path.to_string(),
                message: e.to_string(),
            })
        }
    }

    fn config(concurrency: usize, max_attempts: u32) -> CrawlConfig {
        CrawlConfig {
            path_prefix: "/".to_string(),
            concurrency,
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
            },
        }
    }

    fn sample_tree() -> FakeListing {
        FakeListing::default()
            .with(
                "/",
                json!({
                    "dirs": [{"href": "album/"}],
                    "files": [{"href": "a.txt", "lead": "/a.txt"}, {"href": "b.txt"}],
                }),
            )
            .with(
                "/album/",
                json!({
                    "dirs": [{"href": "disc1/"}, {"href": "empty/"}],
                    "files": [{"href": "cover.jpg", "tags": {"w": 600}}],
                }),
            )
            .with(
                "/album/disc1/",
                json!({"dirs": [], "files": [{"href": "01.flac"}, {"href": "02.flac"}]}),
            )
    }

    #[tokio::test]
    async fn builds_full_tree_in_listing_order() {
        let crawler = TreeCrawler::new(Arc::new(sample_tree()), config(4, 3));
        let report = crawler.crawl().await.expect("crawl");

        assert!(report.is_complete());
        assert_eq!(report.node_count(), 8);

        let album = &report.forest[0];
        assert_eq!(album.href, "album/");
        assert_eq!(report.forest[1].href, "a.txt");
        assert_eq!(report.forest[1].lead, "/a.txt");

        let names: Vec<_> = album.children.iter().map(|c| c.href.as_str()).collect();
        assert_eq!(names, ["disc1/", "empty/", "cover.jpg"]);

        let disc: Vec<_> = album.children[0].children.iter().map(|c| c.href.as_str()).collect();
        assert_eq!(disc, ["01.flac", "02.flac"]);
        assert!(album.children[1].children.is_empty());
        assert!(album.children[1].listing_error.is_none());
    }

    #[tokio::test]
    async fn fail_once_then_succeed_matches_first_try() {
        let clean = TreeCrawler::new(Arc::new(sample_tree()), config(4, 3))
            .crawl()
            .await
            .expect("clean crawl");

        let flaky = Arc::new(sample_tree().failing("/album/", 1));
        let retried = TreeCrawler::new(flaky.clone(), config(4, 3))
            .crawl()
            .await
            .expect("retried crawl");

        assert_eq!(flaky.calls_for("/album/"), 2);
        assert!(retried.is_complete());
        assert_eq!(clean.forest, retried.forest);
    }

    #[tokio::test]
    async fn exhausted_retries_flag_only_that_subtree() {
        let source = Arc::new(sample_tree().failing("/album/disc1/", usize::MAX));
        let report = TreeCrawler::new(source.clone(), config(4, 3))
            .crawl()
            .await
            .expect("partial crawl");

        assert_eq!(source.calls_for("/album/disc1/"), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, "/album/disc1/");

        let album = &report.forest[0];
        let disc1 = &album.children[0];
        assert!(disc1.children.is_empty());
        assert!(disc1.listing_error.is_some());
        assert_eq!(album.children[2].href, "cover.jpg");
        assert_eq!(report.forest.len(), 3);
    }

    #[tokio::test]
    async fn root_failure_is_fatal() {
        let source = Arc::new(sample_tree().failing("/", usize::MAX));
        let result = TreeCrawler::new(source, config(4, 2)).crawl().await;

        match result {
            Err(crate::Error::Crawl(CrawlError::RootUnavailable { attempts, .. })) => {
                assert_eq!(attempts, 2)
            }
            other => panic!("expected root failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn in_flight_requests_never_exceed_limit() {
        // 20 top-level directories, each with 5 subdirectories.
        let top: Vec<Value> = (0..20).map(|i| json!({"href": format!("d{i}/")})).collect();
        let mut source = FakeListing {
            delay: Some(Duration::from_millis(5)),
            ..FakeListing::default()
        }
        .with("/", json!({"dirs": top, "files": []}));
        for i in 0..20 {
            let subs: Vec<Value> = (0..5).map(|j| json!({"href": format!("s{j}/")})).collect();
            source = source.with(&format!("/d{i}/"), json!({"dirs": subs, "files": []}));
        }

        let source = Arc::new(source);
        let report = TreeCrawler::new(source.clone(), config(3, 1))
            .crawl()
            .await
            .expect("crawl");

        assert_eq!(report.node_count(), 20 + 20 * 5);
        assert_eq!(source.calls.lock().len(), 1 + 20 + 100);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert!(source.max_in_flight.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn path_prefix_is_normalized() {
        let source = Arc::new(
            FakeListing::default().with("/music/", json!({"dirs": [], "files": [{"href": "x"}]})),
        );
        let mut cfg = config(2, 1);
        cfg.path_prefix = "music".to_string();

        let report = TreeCrawler::new(source.clone(), cfg).crawl().await.expect("crawl");
        assert_eq!(report.forest.len(), 1);
        assert_eq!(report.root, "/music/");
        assert_eq!(source.calls_for("/music/"), 1);
    }

    #[tokio::test]
    async fn documents_keep_the_crawl_prefix() {
        let source = Arc::new(
            FakeListing::default()
                .with("/music/", json!({"dirs": [{"href": "album/"}], "files": []}))
                .with("/music/album/", json!({"dirs": [], "files": [{"href": "x.flac"}]})),
        );
        let mut cfg = config(2, 1);
        cfg.path_prefix = "music".to_string();

        let report = TreeCrawler::new(source, cfg).crawl().await.expect("crawl");
        let docs = report.documents(&FlattenOptions {
            include_dirs: true,
            base_url: Some("https://h/".to_string()),
        });

        let hrefs: Vec<_> = docs.iter().map(|d| d.full_href.as_str()).collect();
        assert_eq!(hrefs, ["https://h/music/album/", "https://h/music/album/x.flac"]);
        assert_eq!(docs[0].lead, "https://h/music/album/?zip=crc");
    }

    #[tokio::test]
    async fn hung_request_times_out_into_retry_path() {
        let source = Arc::new(FakeListing {
            delay: Some(Duration::from_secs(60)),
            ..FakeListing::default()
        });
        let mut cfg = config(2, 2);
        cfg.request_timeout = Duration::from_millis(10);

        let result = TreeCrawler::new(source.clone(), cfg).crawl().await;
        assert!(matches!(
            result,
            Err(crate::Error::Crawl(CrawlError::RootUnavailable { attempts: 2, .. }))
        ));
        assert_eq!(source.calls_for("/"), 2);
    }
}
