//! Process configuration: TOML file layered under `COPYSEARCH_*` environment
//! variables.
//!
//! ```toml
//! [listing]
//! root_url = "https://files.example.com"
//! password = "hunter2"
//!
//! [search]
//! host = "http://localhost:7700"
//! api_key = "masterKey"
//! ```
//!
//! Nested keys map to environment variables with a `__` separator, e.g.
//! `COPYSEARCH_LISTING__ROOT_URL` or `COPYSEARCH_SEARCH__FORCE_REINDEX=true`.

use crate::error::ConfigError;
use crate::mirror::models::SEARCHABLE_ATTRIBUTES;
use crate::mirror::{CrawlConfig, FlattenOptions, MirrorConfig, RetryPolicy, SyncConfig};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "COPYSEARCH";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub listing: ListingSettings,
    #[serde(default)]
    pub flatten: FlattenSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// The `[listing]` section: the remote file server.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingSettings {
    /// Base URL of the file server, without a trailing path.
    #[serde(default)]
    pub root_url: Option<String>,
    /// Sent in the `PW` header.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// The `[flatten]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FlattenSettings {
    #[serde(default = "default_true")]
    pub include_dirs: bool,
    /// Public URL of the file server root for links, e.g. `https://files.example.com/`.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

/// The `[search]` section: the Meilisearch backend.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub force_reindex: bool,
    #[serde(default = "default_searchable_attributes")]
    pub searchable_attributes: Vec<String>,
}

/// The `[logging]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

fn default_path_prefix() -> String {
    "/".to_string()
}

fn default_fetch_concurrency() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_index() -> String {
    "files".to_string()
}

fn default_batch_size() -> usize {
    5000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_task_timeout_secs() -> u64 {
    600
}

fn default_searchable_attributes() -> Vec<String> {
    SEARCHABLE_ATTRIBUTES.iter().map(|s| s.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            root_url: None,
            password: None,
            path_prefix: default_path_prefix(),
            fetch_concurrency: default_fetch_concurrency(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for FlattenSettings {
    fn default() -> Self {
        Self {
            include_dirs: true,
            public_base_url: None,
        }
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            host: None,
            api_key: None,
            index: default_index(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            task_timeout_secs: default_task_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            force_reindex: false,
            searchable_attributes: default_searchable_attributes(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: true,
        }
    }
}

impl Config {
    /// Default config file location: `{config_dir}/copysearch/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("copysearch").join("config.toml"))
    }

    /// Load from `path` (or the default location) and the environment.
    ///
    /// A missing file is not an error; an explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(::config::File::from(path).required(true));
            }
            None => {
                if let Some(default) = Self::default_path() {
                    builder = builder.add_source(::config::File::from(default).required(false));
                }
            }
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Parse a TOML string, without environment overlay.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|error| ConfigError::Invalid {
            key: "config",
            message: error.to_string(),
        })
    }

    /// Fail fast on values the pipeline cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listing.root_url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("listing.root_url"));
        }
        if self.listing.password.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("listing.password"));
        }
        if self.search.host.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::Missing("search.host"));
        }
        if self.listing.fetch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "listing.fetch_concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.listing.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "listing.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.search.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "search.batch_size",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Runtime settings for the crawl → flatten → sync pipeline.
    pub fn mirror(&self) -> MirrorConfig {
        MirrorConfig {
            crawl: CrawlConfig {
                path_prefix: self.listing.path_prefix.clone(),
                concurrency: self.listing.fetch_concurrency,
                request_timeout: Duration::from_secs(self.listing.request_timeout_secs),
                retry: RetryPolicy {
                    max_attempts: self.listing.max_attempts,
                    initial_backoff: Duration::from_millis(self.listing.initial_backoff_ms),
                    max_backoff: Duration::from_millis(self.listing.max_backoff_ms),
                },
            },
            flatten: FlattenOptions {
                include_dirs: self.flatten.include_dirs,
                base_url: self.flatten.public_base_url.clone(),
            },
            sync: SyncConfig {
                batch_size: self.search.batch_size,
                poll_interval: Duration::from_millis(self.search.poll_interval_ms),
                task_timeout: Duration::from_secs(self.search.task_timeout_secs),
                force_reindex: self.search.force_reindex,
                searchable_attributes: self.search.searchable_attributes.clone(),
            },
        }
    }
}
