//! In-memory search backend used by unit tests.

use crate::error::BackendError;
use crate::mirror::backend::{IndexInfo, IndexStats, SearchBackend, Task, TaskError, TaskId, TaskStatus};
use crate::mirror::models::SearchDocument;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// A backend call as observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    DeleteAll,
    Add { task: TaskId, size: usize },
    Poll { task: TaskId, status: TaskStatus },
    UpdateSearchable(Vec<String>),
    Search(String),
}

impl Call {
    pub(crate) fn is_write(&self) -> bool {
        matches!(
            self,
            Call::DeleteAll | Call::Add { .. } | Call::UpdateSearchable(_)
        )
    }
}

/// How the fake's delete-all call misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClearFailure {
    /// The request itself is rejected.
    Request,
    /// The request is accepted but its task fails.
    Task,
}

/// Fake backend. Tasks report `Processing` for `polls_before_done` polls
/// and then succeed, unless the task's batch index is listed in
/// `failing_batches`.
#[derive(Default)]
pub(crate) struct FakeBackend {
    existing: Option<u64>,
    unreachable: bool,
    polls_before_done: usize,
    failing_batches: Vec<usize>,
    failing_clear: Option<ClearFailure>,
    calls: Mutex<Vec<Call>>,
    pub(crate) stored: Mutex<Vec<SearchDocument>>,
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    next_task: TaskId,
    batches_added: usize,
    polls: HashMap<TaskId, usize>,
    failing: HashMap<TaskId, bool>,
    cleared: bool,
}

impl FakeBackend {
    pub(crate) fn with_existing(documents: u64) -> Self {
        Self {
            existing: Some(documents),
            ..Self::default()
        }
    }

    /// Every call fails with `Unreachable`.
    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Tasks stay `Processing` for `polls` polls before finishing.
    pub(crate) fn polling(mut self, polls: usize) -> Self {
        self.polls_before_done = polls;
        self
    }

    /// Tasks for these zero-based upload batches fail.
    pub(crate) fn failing_batches(mut self, batches: impl IntoIterator<Item = usize>) -> Self {
        self.failing_batches = batches.into_iter().collect();
        self
    }

    pub(crate) fn failing_clear(mut self, failure: ClearFailure) -> Self {
        self.failing_clear = Some(failure);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn next_task(&self, failing: bool) -> TaskId {
        let mut state = self.state.lock();
        state.next_task += 1;
        let id = state.next_task;
        state.failing.insert(id, failing);
        id
    }

    fn check_reachable(&self) -> Result<(), BackendError> {
        if self.unreachable {
            Err(BackendError::Unreachable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    async fn health(&self) -> Result<(), BackendError> {
        self.check_reachable()
    }

    async fn index_info(&self) -> Result<Option<IndexInfo>, BackendError> {
        self.check_reachable()?;
        Ok(self.existing.map(|_| IndexInfo {
            uid: "files".into(),
            created_at: Some("2026-01-01T00:00:00Z".into()),
        }))
    }

    async fn stats(&self) -> Result<Option<IndexStats>, BackendError> {
        self.check_reachable()?;
        let stored = self.stored.lock().len() as u64;
        let existing = if self.state.lock().cleared {
            None
        } else {
            self.existing
        };
        if self.existing.is_none() && stored == 0 {
            return Ok(None);
        }
        Ok(Some(IndexStats {
            number_of_documents: existing.unwrap_or(0) + stored,
        }))
    }

    async fn delete_all_documents(&self) -> Result<TaskId, BackendError> {
        self.check_reachable()?;
        self.calls.lock().push(Call::DeleteAll);
        match self.failing_clear {
            Some(ClearFailure::Request) => Err(BackendError::Status {
                operation: "delete documents",
                status: 500,
                body: "internal error".into(),
            }),
            Some(ClearFailure::Task) => Ok(self.next_task(true)),
            None => {
                self.stored.lock().clear();
                self.state.lock().cleared = true;
                Ok(self.next_task(false))
            }
        }
    }

    async fn add_documents(&self, documents: &[SearchDocument]) -> Result<TaskId, BackendError> {
        self.check_reachable()?;
        let batch = {
            let mut state = self.state.lock();
            state.batches_added += 1;
            state.batches_added - 1
        };
        let task = self.next_task(self.failing_batches.contains(&batch));
        self.calls.lock().push(Call::Add {
            task,
            size: documents.len(),
        });
        self.stored.lock().extend_from_slice(documents);
        Ok(task)
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Task, BackendError> {
        self.check_reachable()?;
        let (status, failing) = {
            let mut state = self.state.lock();
            let polls = state.polls.entry(task_id).or_insert(0);
            *polls += 1;
            let done = *polls > self.polls_before_done;
            let failing = state.failing.get(&task_id).copied().unwrap_or(false);
            let status = match (done, failing) {
                (false, _) => TaskStatus::Processing,
                (true, false) => TaskStatus::Succeeded,
                (true, true) => TaskStatus::Failed,
            };
            (status, failing)
        };

        self.calls.lock().push(Call::Poll {
            task: task_id,
            status,
        });

        Ok(Task {
            uid: task_id,
            status,
            error: (failing && status == TaskStatus::Failed).then(|| TaskError {
                message: "invalid document".into(),
                code: Some("invalid_document_id".into()),
                kind: None,
            }),
        })
    }

    async fn update_searchable_attributes(
        &self,
        attributes: &[String],
    ) -> Result<TaskId, BackendError> {
        self.check_reachable()?;
        self.calls
            .lock()
            .push(Call::UpdateSearchable(attributes.to_vec()));
        Ok(self.next_task(false))
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>, BackendError> {
        self.check_reachable()?;
        self.calls.lock().push(Call::Search(query.to_string()));
        let query = query.to_lowercase();
        Ok(self
            .stored
            .lock()
            .iter()
            .filter(|doc| doc.full_href.to_lowercase().contains(&query))
            .take(limit)
            .cloned()
            .collect())
    }
}
