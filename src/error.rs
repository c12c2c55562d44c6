//! Error types for the crawl, index and configuration layers.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the mirror pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failures fetching or decoding a directory listing.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    #[error("listing request for {path} failed: {message}")]
    Request { path: String, message: String },

    #[error("listing request for {path} timed out")]
    Timeout { path: String },

    #[error("listing for {path} returned HTTP {status}")]
    Status { path: String, status: u16 },

    #[error("listing for {path} could not be parsed: {message}")]
    Parse { path: String, message: String },

    #[error("root listing {path} unavailable after {attempts} attempts: {last_error}")]
    RootUnavailable {
        path: String,
        attempts: u32,
        last_error: String,
    },
}

/// Failures talking to the search backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("search backend unreachable: {0}")]
    Unreachable(String),

    #[error("search backend returned HTTP {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("search backend response for {operation} could not be decoded: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },

    #[error("no search index available yet")]
    IndexNotReady,

    #[error("backend task {task_id} failed: {detail}")]
    TaskFailed { task_id: u64, detail: String },

    #[error("backend task {task_id} still pending after {waited_secs}s")]
    TaskTimedOut { task_id: u64, waited_secs: u64 },
}

/// Invalid or incomplete configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid configuration value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}
