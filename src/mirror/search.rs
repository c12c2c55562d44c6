//! Query side: backend-backed index search and an in-memory fuzzy matcher.

use crate::error::{BackendError, Result};
use crate::mirror::backend::SearchBackend;
use crate::mirror::models::SearchDocument;

use std::sync::Arc;

/// Handle to the synchronized index.
///
/// Distinguishes "no index yet" from "backend unreachable" so callers never
/// mistake either for an empty result.
#[derive(Clone)]
pub struct IndexHandle {
    backend: Arc<dyn SearchBackend>,
}

impl IndexHandle {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Search the index. An empty query or a zero limit yields no hits
    /// without contacting the backend.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchDocument>> {
        let trimmed = query.trim();
        if trimmed.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        match self.backend.stats().await? {
            Some(stats) if stats.number_of_documents > 0 => {}
            _ => return Err(BackendError::IndexNotReady.into()),
        }

        let hits = self.backend.search(trimmed, limit).await?;
        Ok(hits)
    }
}

/// A scored in-memory match.
#[derive(Debug, Clone)]
pub struct MatchResult<'a> {
    pub document: &'a SearchDocument,
    pub score: f32,
}

/// Fuzzy matcher over a flattened document set, for use without a backend.
pub struct DocumentMatcher {
    entries: Vec<MatchEntry>,
}

struct MatchEntry {
    name: String,
    path: String,
    document: SearchDocument,
}

impl DocumentMatcher {
    pub fn new(documents: Vec<SearchDocument>) -> Self {
        let entries = documents
            .into_iter()
            .map(|document| MatchEntry {
                name: document.display_name().to_lowercase(),
                path: decode_lossy(&document.full_href).to_lowercase(),
                document,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every query word must match the entry's name, its path, or (as a
    /// subsequence) its name. Results are ordered by score, then by shorter
    /// path, then by flattening order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<MatchResult<'_>> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(|word| word.to_lowercase())
            .collect();
        if words.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, MatchResult<'_>)> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(position, entry)| {
                let score = entry_score(entry, &words)?;
                Some((
                    position,
                    MatchResult {
                        document: &entry.document,
                        score,
                    },
                ))
            })
            .collect();

        scored.sort_by(|(pos_a, a), (pos_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.full_href.len().cmp(&b.document.full_href.len()))
                .then_with(|| pos_a.cmp(pos_b))
        });

        scored
            .into_iter()
            .take(limit)
            .map(|(_, result)| result)
            .collect()
    }
}

fn entry_score(entry: &MatchEntry, words: &[String]) -> Option<f32> {
    let mut total = 0.0;
    for word in words {
        total += if entry.name.contains(word.as_str()) {
            1.0
        } else if entry.path.contains(word.as_str()) {
            0.6
        } else if is_subsequence(word, &entry.name) {
            0.3
        } else {
            return None;
        };
    }
    Some(total / words.len() as f32)
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut remaining = haystack.chars();
    needle
        .chars()
        .all(|c| remaining.by_ref().any(|h| h == c))
}

fn decode_lossy(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::flatten::{FlattenOptions, flatten};
    use crate::mirror::models::{NodeKind, Tags, TreeNode};
    use crate::mirror::testing::FakeBackend;

    fn node(href: &str, kind: NodeKind, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            lead: String::new(),
            href: href.to_string(),
            ext: String::new(),
            sz: 0,
            ts: 0,
            tags: Tags::new(),
            params: String::new(),
            kind,
            children,
            listing_error: None,
        }
    }

    fn library() -> Vec<SearchDocument> {
        let forest = vec![
            node(
                "Boards%20of%20Canada/",
                NodeKind::Directory,
                vec![
                    node("Roygbiv.flac", NodeKind::File, vec![]),
                    node("Dayvan%20Cowboy.flac", NodeKind::File, vec![]),
                ],
            ),
            node("cowboy%20bebop%20ost.zip", NodeKind::File, vec![]),
        ];
        flatten(&forest, &FlattenOptions::default())
    }

    #[test]
    fn name_matches_rank_above_path_matches() {
        let matcher = DocumentMatcher::new(library());
        let results = matcher.search("cowboy", 10);

        let names: Vec<_> = results.iter().map(|r| r.document.display_name()).collect();
        assert_eq!(names, ["cowboy bebop ost.zip", "Dayvan Cowboy.flac"]);
    }

    #[test]
    fn all_words_must_match() {
        let matcher = DocumentMatcher::new(library());
        assert_eq!(matcher.search("boards roygbiv", 10).len(), 1);
        assert!(matcher.search("roygbiv bebop", 10).is_empty());
    }

    #[test]
    fn subsequence_matches_abbreviations() {
        let matcher = DocumentMatcher::new(library());
        let results = matcher.search("rygbv", 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document.href, "Roygbiv.flac");
        assert!(results[0].score < 0.5);
    }

    #[test]
    fn limit_and_empty_query() {
        let matcher = DocumentMatcher::new(library());
        assert_eq!(matcher.len(), 4);
        assert_eq!(matcher.search("a", 2).len(), 2);
        assert!(matcher.search("   ", 10).is_empty());
        assert!(matcher.search("a", 0).is_empty());
    }

    #[tokio::test]
    async fn zero_limit_returns_no_hits_from_either_search() {
        let backend = Arc::new(FakeBackend::default());
        backend.stored.lock().extend(library());
        let handle = IndexHandle::new(backend.clone());

        assert!(handle.search("roygbiv", 0).await.expect("search").is_empty());
        assert!(DocumentMatcher::new(library()).search("roygbiv", 0).is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn index_handle_reports_missing_index() {
        let handle = IndexHandle::new(Arc::new(FakeBackend::default()));
        let result = handle.search("anything", 10).await;
        assert!(matches!(
            result,
            Err(crate::Error::Backend(BackendError::IndexNotReady))
        ));
    }

    #[tokio::test]
    async fn index_handle_reports_unreachable_backend() {
        let handle = IndexHandle::new(Arc::new(FakeBackend::unreachable()));
        let result = handle.search("anything", 10).await;
        assert!(matches!(
            result,
            Err(crate::Error::Backend(BackendError::Unreachable(_)))
        ));
    }

    #[tokio::test]
    async fn index_handle_searches_populated_index() {
        let backend = FakeBackend::default();
        backend.stored.lock().extend(library());
        let handle = IndexHandle::new(Arc::new(backend));

        let hits = handle.search("roygbiv", 10).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].full_href, "Boards%20of%20Canada/Roygbiv.flac");
    }
}
