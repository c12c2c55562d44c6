//! Index synchronization: replace the backend's documents with a fresh set.
//!
//! A run goes Check → Clear → Upload → Await → Done. Batches are uploaded one
//! at a time and each batch's task must succeed before the next is sent. A
//! failed task aborts the run and leaves already-written batches in place.

use crate::error::{BackendError, Result};
use crate::mirror::backend::{SearchBackend, Task, TaskId, TaskStatus};
use crate::mirror::config::SyncConfig;
use crate::mirror::models::SearchDocument;

use std::sync::Arc;
use std::time::Instant;

/// Outcome of the Check step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// A populated index exists and no reindex was forced.
    Skip { existing_documents: u64 },
    Rebuild,
}

/// Outcome of a synchronization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped { existing_documents: u64 },
    Indexed { documents: usize, batches: usize },
}

/// Drives a [`SearchBackend`] through a full replace of its documents.
pub struct IndexSynchronizer {
    backend: Arc<dyn SearchBackend>,
    config: SyncConfig,
}

impl IndexSynchronizer {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SyncConfig) -> Self {
        Self { backend, config }
    }

    /// Decide whether a rebuild is needed.
    ///
    /// Metadata or stats lookups that fail are treated as "no index".
    pub async fn check(&self) -> SyncDecision {
        if self.config.force_reindex {
            tracing::info!("forced reindex requested");
            return SyncDecision::Rebuild;
        }

        let info = match self.backend.index_info().await {
            Ok(info) => info,
            Err(error) => {
                tracing::warn!(%error, "failed to read index metadata, assuming no index");
                None
            }
        };
        let stats = match self.backend.stats().await {
            Ok(stats) => stats,
            Err(error) => {
                tracing::warn!(%error, "failed to read index stats, assuming no index");
                None
            }
        };

        match (info, stats) {
            (Some(info), Some(stats))
                if info.created_at.is_some() && stats.number_of_documents > 0 =>
            {
                SyncDecision::Skip {
                    existing_documents: stats.number_of_documents,
                }
            }
            _ => SyncDecision::Rebuild,
        }
    }

    /// Check, then rebuild if needed.
    pub async fn sync(&self, documents: &[SearchDocument]) -> Result<SyncOutcome> {
        match self.check().await {
            SyncDecision::Skip { existing_documents } => {
                tracing::info!(existing_documents, "index already populated, skipping sync");
                Ok(SyncOutcome::Skipped { existing_documents })
            }
            SyncDecision::Rebuild => self.rebuild(documents).await,
        }
    }

    /// Clear the index and upload `documents` in order.
    pub async fn rebuild(&self, documents: &[SearchDocument]) -> Result<SyncOutcome> {
        self.clear().await;

        let batch_size = self.config.batch_size.max(1);
        let total = documents.len();
        let mut batches = 0;

        for (index, batch) in documents.chunks(batch_size).enumerate() {
            let start = index * batch_size;
            tracing::info!(
                batch = index,
                start,
                end = start + batch.len(),
                total,
                "uploading documents"
            );

            let task_id = self.backend.add_documents(batch).await?;
            self.wait_for_task(task_id).await?;
            batches += 1;
        }

        self.update_searchable_attributes().await;

        tracing::info!(documents = total, batches, "indexing complete");
        Ok(SyncOutcome::Indexed {
            documents: total,
            batches,
        })
    }

    /// Poll a task until it reaches a terminal status.
    pub async fn wait_for_task(&self, task_id: TaskId) -> Result<Task> {
        let started = Instant::now();

        loop {
            let task = self.backend.get_task(task_id).await?;
            if !task.status.is_pending() {
                if task.status == TaskStatus::Succeeded {
                    return Ok(task);
                }
                let detail = task.detail();
                tracing::error!(task_id, status = ?task.status, %detail, "backend task failed");
                return Err(BackendError::TaskFailed { task_id, detail }.into());
            }

            if started.elapsed() >= self.config.task_timeout {
                return Err(BackendError::TaskTimedOut {
                    task_id,
                    waited_secs: started.elapsed().as_secs(),
                }
                .into());
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// A failed clear still leaves the subsequent upload correct.
    async fn clear(&self) {
        let cleared = match self.backend.delete_all_documents().await {
            Ok(task_id) => self.wait_for_task(task_id).await.map(|_| ()),
            Err(error) => Err(error.into()),
        };
        if let Err(error) = cleared {
            tracing::warn!(%error, "failed to clear index, treating it as empty");
        }
    }

    async fn update_searchable_attributes(&self) {
        if self.config.searchable_attributes.is_empty() {
            return;
        }

        let updated = match self
            .backend
            .update_searchable_attributes(&self.config.searchable_attributes)
            .await
        {
            Ok(task_id) => self.wait_for_task(task_id).await.map(|_| ()),
            Err(error) => Err(error.into()),
        };
        if let Err(error) = updated {
            tracing::warn!(%error, "failed to update searchable attributes");
        }
    }
}
