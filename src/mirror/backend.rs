//! Search backend interface and its Meilisearch HTTP implementation.

use crate::error::BackendError;
use crate::mirror::models::SearchDocument;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Opaque identifier of an asynchronous backend write.
pub type TaskId = u64;

/// Index metadata. Presence means the index exists.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub uid: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Document statistics for an index.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub number_of_documents: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskStatus::Enqueued | TaskStatus::Processing)
    }
}

/// Error detail attached to a failed task.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// Status of an asynchronous write.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    pub uid: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<TaskError>,
}

impl Task {
    /// Human-readable failure detail.
    pub fn detail(&self) -> String {
        match &self.error {
            Some(error) => match &error.code {
                Some(code) => format!("{} ({code})", error.message),
                None => error.message.clone(),
            },
            None => format!("task ended with status {:?}", self.status),
        }
    }
}

/// Operations the synchronizer and search layer need from a backend.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fails when the backend cannot be reached.
    async fn health(&self) -> Result<(), BackendError>;

    /// `None` when the index does not exist.
    async fn index_info(&self) -> Result<Option<IndexInfo>, BackendError>;

    /// `None` when the index does not exist.
    async fn stats(&self) -> Result<Option<IndexStats>, BackendError>;

    async fn delete_all_documents(&self) -> Result<TaskId, BackendError>;

    async fn add_documents(&self, documents: &[SearchDocument]) -> Result<TaskId, BackendError>;

    async fn get_task(&self, task_id: TaskId) -> Result<Task, BackendError>;

    async fn update_searchable_attributes(
        &self,
        attributes: &[String],
    ) -> Result<TaskId, BackendError>;

    async fn search(&self, query: &str, limit: usize)
    -> Result<Vec<SearchDocument>, BackendError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueuedTask {
    task_uid: TaskId,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<SearchDocument>,
}

/// Meilisearch client bound to a single index.
#[derive(Clone)]
pub struct MeilisearchBackend {
    client: reqwest::Client,
    host: String,
    api_key: Option<String>,
    index_uid: String,
}

impl MeilisearchBackend {
    pub fn new(
        host: impl Into<String>,
        api_key: Option<String>,
        index_uid: impl Into<String>,
        request_timeout: Duration,
    ) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build search backend HTTP client: {e}"))?;

        Ok(Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            api_key,
            index_uid: index_uid.into(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, format!("{}{}", self.host, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn index_path(&self, suffix: &str) -> String {
        format!("/indexes/{}{}", self.index_uid, suffix)
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, BackendError> {
        request.send().await.map_err(|error| {
            tracing::debug!(operation, %error, "search backend request failed");
            BackendError::Unreachable(error.to_string())
        })
    }

    async fn enqueue(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<TaskId, BackendError> {
        let response = self.send(operation, request).await?;
        let task: EnqueuedTask = decode(operation, response).await?;
        tracing::debug!(operation, task_id = task.task_uid, "backend task enqueued");
        Ok(task.task_uid)
    }
}

async fn decode<T: DeserializeOwned>(
    operation: &'static str,
    response: Response,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Status {
            operation,
            status: status.as_u16(),
            body,
        });
    }

    response.json::<T>().await.map_err(|error| BackendError::Decode {
        operation,
        message: error.to_string(),
    })
}

#[async_trait]
impl SearchBackend for MeilisearchBackend {
    async fn health(&self) -> Result<(), BackendError> {
        let response = self.send("health", self.request(Method::GET, "/health")).await?;
        let _: serde_json::Value = decode("health", response).await?;
        Ok(())
    }

    async fn index_info(&self) -> Result<Option<IndexInfo>, BackendError> {
        let request = self.request(Method::GET, &self.index_path(""));
        let response = self.send("get index", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode("get index", response).await.map(Some)
    }

    async fn stats(&self) -> Result<Option<IndexStats>, BackendError> {
        let request = self.request(Method::GET, &self.index_path("/stats"));
        let response = self.send("get stats", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode("get stats", response).await.map(Some)
    }

    async fn delete_all_documents(&self) -> Result<TaskId, BackendError> {
        let request = self.request(Method::DELETE, &self.index_path("/documents"));
        self.enqueue("delete documents", request).await
    }

    async fn add_documents(&self, documents: &[SearchDocument]) -> Result<TaskId, BackendError> {
        let request = self
            .request(Method::POST, &self.index_path("/documents"))
            .query(&[("primaryKey", "id")])
            .json(documents);
        self.enqueue("add documents", request).await
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Task, BackendError> {
        let request = self.request(Method::GET, &format!("/tasks/{task_id}"));
        let response = self.send("get task", request).await?;
        decode("get task", response).await
    }

    async fn update_searchable_attributes(
        &self,
        attributes: &[String],
    ) -> Result<TaskId, BackendError> {
        let request = self
            .request(
                Method::PUT,
                &self.index_path("/settings/searchable-attributes"),
            )
            .json(attributes);
        self.enqueue("update searchable attributes", request).await
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchDocument>, BackendError> {
        let request = self
            .request(Method::POST, &self.index_path("/search"))
            .json(&serde_json::json!({ "q": query, "limit": limit }));
        let response = self.send("search", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::IndexNotReady);
        }
        let results: SearchResponse = decode("search", response).await?;
        Ok(results.hits)
    }
}
