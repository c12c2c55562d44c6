//! Remote directory-listing API: wire types and the HTTP client.
//!
//! A listing is fetched with `GET {root}{path}?ls&dots` and answers with the
//! immediate children of `path` as `{ "dirs": [...], "files": [...] }`.

use crate::error::CrawlError;
use crate::mirror::models::{NodeKind, Tags, TreeNode};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// Header carrying the file server password.
const PASSWORD_HEADER: &str = "PW";

/// Body of a listing response.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingResponse {
    pub dirs: Vec<RawEntry>,
    pub files: Vec<RawEntry>,
}

/// A single entry as sent by the listing API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEntry {
    pub href: String,
    #[serde(default)]
    pub lead: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub sz: Option<u64>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub tags: Option<RawTags>,
    #[serde(default)]
    pub params: Option<String>,
}

/// The two tag encodings the listing API is known to produce.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTags {
    /// `[{"artist": "x"}, {"album": "y"}]`
    List(Vec<Map<String, Value>>),
    /// `{"artist": "x", "album": "y"}`
    Map(Map<String, Value>),
}

impl ListingResponse {
    /// Convert into tree nodes, directories first, each in listing order.
    ///
    /// Entries with an empty href are rejected and logged.
    pub fn into_nodes(self, path: &str) -> Vec<TreeNode> {
        let dirs = self
            .dirs
            .into_iter()
            .map(|entry| (entry, NodeKind::Directory));
        let files = self.files.into_iter().map(|entry| (entry, NodeKind::File));

        dirs.chain(files)
            .filter_map(|(entry, kind)| match entry.into_node(kind) {
                Some(node) => Some(node),
                None => {
                    tracing::warn!(path, %kind, "rejecting listing entry with empty href");
                    None
                }
            })
            .collect()
    }
}

impl RawEntry {
    fn into_node(self, kind: NodeKind) -> Option<TreeNode> {
        let href = self.href.trim_start_matches('/');
        if href.is_empty() {
            return None;
        }

        Some(TreeNode {
            lead: self.lead.unwrap_or_default(),
            href: href.to_string(),
            ext: self.ext.unwrap_or_default(),
            sz: self.sz.unwrap_or_default(),
            ts: self.ts.unwrap_or_default(),
            tags: normalize_tags(self.tags),
            params: self.params.unwrap_or_default(),
            kind,
            children: Vec::new(),
            listing_error: None,
        })
    }
}

/// Collapse either tag encoding into the canonical pair set.
pub fn normalize_tags(raw: Option<RawTags>) -> Tags {
    let mut tags = Tags::new();
    match raw {
        None => {}
        Some(RawTags::List(list)) => {
            for mapping in list {
                for (key, value) in mapping {
                    tags.insert((key, tag_value(&value)));
                }
            }
        }
        Some(RawTags::Map(mapping)) => {
            for (key, value) in mapping {
                tags.insert((key, tag_value(&value)));
            }
        }
    }
    tags
}

fn tag_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Source of directory listings. Implemented over HTTP in production and by
/// in-memory fakes in tests.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the immediate children of `path` (absolute, starting with `/`).
    async fn fetch(&self, path: &str) -> Result<ListingResponse, CrawlError>;
}

/// Listing client for a copyparty-style file server.
#[derive(Clone)]
pub struct HttpListingClient {
    client: reqwest::Client,
    root_url: String,
    password: Option<String>,
}

impl HttpListingClient {
    /// Build a client. Every request is bounded by `request_timeout`.
    pub fn new(
        root_url: impl Into<String>,
        password: Option<String>,
        request_timeout: Duration,
    ) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build listing HTTP client: {e}"))?;

        Ok(Self {
            client,
            root_url: root_url.into().trim_end_matches('/').to_string(),
            password,
        })
    }

    fn listing_url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}?ls&dots", self.root_url, path)
        } else {
            format!("{}/{}?ls&dots", self.root_url, path)
        }
    }
}

#[async_trait]
impl ListingSource for HttpListingClient {
    async fn fetch(&self, path: &str) -> Result<ListingResponse, CrawlError> {
        let url = self.listing_url(path);
        tracing::debug!(%url, "fetching listing");

        let mut request = self.client.get(&url);
        if let Some(password) = &self.password {
            request = request.header(PASSWORD_HEADER, password);
        }

        let response = request
            .send()
            .await
            .map_err(|error| request_error(path, error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|error| request_error(path, error))?;

        serde_json::from_str(&body).map_err(|error| CrawlError::Parse {
            path: path.to_string(),
            message: error.to_string(),
        })
    }
}

fn request_error(path: &str, error: reqwest::Error) -> CrawlError {
    if error.is_timeout() {
        CrawlError::Timeout {
            path: path.to_string(),
        }
    } else {
        CrawlError::Request {
            path: path.to_string(),
            message: error.to_string(),
        }
    }
}
