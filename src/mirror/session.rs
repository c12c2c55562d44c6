//! Per-user search interaction state for a chat front end.
//!
//! One open interaction per key (usually a user id). Starting a new search
//! supersedes the previous one, closing removes it, and idle entries expire.

use moka::Entry;
use moka::ops::compute::Op;
use moka::sync::Cache;
use std::time::Duration;

/// State of one open search interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    pub query: String,
    /// Id of the document the user last selected, if any.
    pub selected: Option<String>,
}

/// Registry of open search interactions keyed by session key.
#[derive(Clone)]
pub struct SearchSessions {
    cache: Cache<String, SearchSession>,
}

impl SearchSessions {
    pub fn new(ttl: Duration, max_sessions: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(ttl)
            .build();
        Self { cache }
    }

    /// Start a session for `key`, returning the one it replaced.
    ///
    /// The swap is atomic per key: concurrent calls each get back a
    /// different predecessor.
    pub fn begin(&self, key: &str, query: impl Into<String>) -> Option<SearchSession> {
        let session = SearchSession {
            query: query.into(),
            selected: None,
        };

        let mut previous = None;
        self.cache
            .entry(key.to_string())
            .and_compute_with(|current| {
                previous = current.map(Entry::into_value);
                Op::Put(session)
            });
        previous
    }

    /// Record a selection on the open session. `None` when no session is
    /// open for `key`.
    pub fn select(&self, key: &str, document_id: impl Into<String>) -> Option<SearchSession> {
        let document_id = document_id.into();

        let mut updated = None;
        self.cache
            .entry(key.to_string())
            .and_compute_with(|current| match current {
                Some(entry) => {
                    let mut session = entry.into_value();
                    session.selected = Some(document_id);
                    updated = Some(session.clone());
                    Op::Put(session)
                }
                None => Op::Nop,
            });
        updated
    }

    pub fn get(&self, key: &str) -> Option<SearchSession> {
        self.cache.get(key)
    }

    /// Close the session for `key`.
    pub fn close(&self, key: &str) -> Option<SearchSession> {
        self.cache.remove(key)
    }

    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SearchSessions {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60), 10_000)
    }
}
