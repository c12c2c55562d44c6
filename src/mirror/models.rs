//! Tree and document types for the mirrored file store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether a listing entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    #[serde(rename = "file")]
    File,
    #[serde(rename = "dir")]
    Directory,
}

impl NodeKind {
    /// String representation used in search documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "dir",
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical tag representation: an ordered set of key/value pairs.
pub type Tags = BTreeSet<(String, String)>;

/// One entry in the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Primary action URL as reported by the listing.
    pub lead: String,
    /// Path segment relative to the parent. Never starts with `/`.
    pub href: String,
    /// File extension, empty for directories.
    pub ext: String,
    /// Size in bytes.
    pub sz: u64,
    /// Modification time, unix seconds.
    pub ts: i64,
    pub tags: Tags,
    /// Opaque query-string fragment.
    pub params: String,
    pub kind: NodeKind,
    /// Children in discovery order. Always empty for files.
    pub children: Vec<TreeNode>,
    /// Set when this directory's listing failed permanently; `children` is
    /// then empty and the subtree is incomplete.
    pub listing_error: Option<String>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Total number of nodes in this subtree, including `self`.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::subtree_len).sum::<usize>()
    }
}

/// One flattened, indexable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Hex SHA-256 of `full_href`.
    pub id: String,
    pub lead: String,
    /// Original relative href.
    pub href: String,
    /// Absolute composed path, used for display and links.
    #[serde(rename = "fullHref")]
    pub full_href: String,
    pub ext: String,
    pub sz: u64,
    pub ts: i64,
    /// Tags rendered as `key:value`, sorted.
    #[serde(default)]
    pub tags: Vec<String>,
    pub params: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Index key, identical to `full_href`.
    pub path: String,
}

impl SearchDocument {
    /// Link that opens the entry in the file server UI.
    pub fn open_url(&self) -> &str {
        &self.full_href
    }

    /// Link that downloads the entry. Directories download as an archive.
    pub fn download_url(&self) -> String {
        match self.kind {
            NodeKind::Directory => self.lead.clone(),
            NodeKind::File => format!("{}?dl", self.full_href),
        }
    }

    /// Human-readable name: the percent-decoded href without a trailing `/`.
    pub fn display_name(&self) -> String {
        let trimmed = self.href.trim_end_matches('/');
        urlencoding::decode(trimmed)
            .map(|name| name.into_owned())
            .unwrap_or_else(|_| trimmed.to_string())
    }

    /// Whether the entry is an image that a chat client could embed inline.
    pub fn is_image(&self) -> bool {
        matches!(
            self.ext.to_ascii_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "gif"
        )
    }
}

/// Field names that the backend searches over.
pub const SEARCHABLE_ATTRIBUTES: &[&str] = &[
    "lead", "href", "fullHref", "ext", "sz", "ts", "tags", "params", "type", "path",
];
