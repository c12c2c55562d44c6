//! Tree flattening: turns a crawled forest into search documents.

use crate::mirror::models::{NodeKind, SearchDocument, TreeNode};
use sha2::{Digest, Sha256};

/// Query suffix that asks the file server for a directory as an archive.
const ARCHIVE_SUFFIX: &str = "?zip=crc";

/// Options controlling document generation.
#[derive(Debug, Clone)]
pub struct FlattenOptions {
    /// Emit a document for each directory as well as for files.
    pub include_dirs: bool,
    /// Public URL of the file server root, prepended to every composed path,
    /// e.g. `https://files.example.com/`. `None` keeps paths relative.
    pub base_url: Option<String>,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            include_dirs: true,
            base_url: None,
        }
    }
}

/// Flatten a forest into documents in depth-first pre-order.
pub fn flatten(forest: &[TreeNode], options: &FlattenOptions) -> Vec<SearchDocument> {
    flatten_under(forest, "", options)
}

/// Flatten a forest that was listed at `root` (e.g. `/music/`), so every
/// composed path starts from the server root.
pub fn flatten_under(
    forest: &[TreeNode],
    root: &str,
    options: &FlattenOptions,
) -> Vec<SearchDocument> {
    let prefix = options
        .base_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .map(ensure_trailing_slash)
        .unwrap_or_default();

    let parent = root.trim_start_matches('/');

    let mut documents = Vec::new();
    for node in forest {
        walk(node, parent, &prefix, options.include_dirs, &mut documents);
    }
    documents
}

fn walk(
    node: &TreeNode,
    parent: &str,
    prefix: &str,
    include_dirs: bool,
    documents: &mut Vec<SearchDocument>,
) {
    let relative = compose_path(parent, &node.href, node.kind);
    let full_href = format!("{prefix}{relative}");

    if node.kind == NodeKind::File || include_dirs {
        documents.push(to_document(node, full_href));
    }

    for child in &node.children {
        walk(child, &relative, prefix, include_dirs, documents);
    }
}

fn to_document(node: &TreeNode, full_href: String) -> SearchDocument {
    let lead = match node.kind {
        NodeKind::Directory => format!("{full_href}{ARCHIVE_SUFFIX}"),
        NodeKind::File => node.lead.clone(),
    };

    SearchDocument {
        id: document_id(&full_href),
        lead,
        href: node.href.clone(),
        ext: node.ext.clone(),
        sz: node.sz,
        ts: node.ts,
        tags: node
            .tags
            .iter()
            .map(|(key, value)| format!("{key}:{value}"))
            .collect(),
        params: node.params.clone(),
        kind: node.kind,
        path: full_href.clone(),
        full_href,
    }
}

/// Stable document identity: hex SHA-256 of the composed path.
pub fn document_id(full_href: &str) -> String {
    hex::encode(Sha256::digest(full_href.as_bytes()))
}

/// Join a parent path and a child href with exactly one `/` between them.
pub fn join_href(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        return child.to_string();
    }
    if child.is_empty() {
        return parent.to_string();
    }
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    format!("{parent}/{child}")
}

/// Compose a node's path under `parent`. Directories always end with one `/`,
/// files never do.
pub fn compose_path(parent: &str, href: &str, kind: NodeKind) -> String {
    let joined = join_href(parent, href);
    match kind {
        NodeKind::Directory => ensure_trailing_slash(&joined),
        NodeKind::File => joined.trim_end_matches('/').to_string(),
    }
}

fn ensure_trailing_slash(path: &str) -> String {
    format!("{}/", path.trim_end_matches('/'))
}
