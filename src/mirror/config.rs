//! Runtime configuration for the crawl and sync stages.

use crate::mirror::models::SEARCHABLE_ATTRIBUTES;
use std::time::Duration;

/// Retry behaviour for a single listing fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempts` consecutive failures.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Configuration for the tree crawler.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Path the crawl starts from, e.g. `/` or `/music/`.
    pub path_prefix: String,
    /// Maximum listing requests in flight across the whole crawl.
    pub concurrency: usize,
    /// Deadline for a single listing request.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/".to_string(),
            concurrency: 10,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Configuration for the index synchronizer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Documents per add-documents call.
    pub batch_size: usize,
    /// Delay between task status polls.
    pub poll_interval: Duration,
    /// How long a single task may stay pending before the run aborts.
    pub task_timeout: Duration,
    /// Rebuild even when a populated index already exists.
    pub force_reindex: bool,
    /// Attributes to mark searchable once upload finishes. Empty skips the
    /// settings update.
    pub searchable_attributes: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            poll_interval: Duration::from_millis(100),
            task_timeout: Duration::from_secs(600),
            force_reindex: false,
            searchable_attributes: SEARCHABLE_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}
