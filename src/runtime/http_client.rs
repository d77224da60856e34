//! HTTP client for the scheduler API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use super::api::{Health, StatusPatch};
use crate::core::{ClientError, FilterRequest, QueueSummary, SchedulerClient, Task, TaskStatus};

/// [`SchedulerClient`] over the scheduler's HTTP API.
///
/// Holds no idle connections, so one client can be shared by workers that
/// each drive it from their own runtime.
#[derive(Debug, Clone)]
pub struct HttpSchedulerClient {
    base_url: String,
    http: Client,
}

impl HttpSchedulerClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8004`).
    ///
    /// # Errors
    ///
    /// `ClientError::Transport` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .user_agent(concat!("prometheus-dispatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            http,
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "scheduler rejected request");
        Err(ClientError::Status {
            code: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SchedulerClient for HttpSchedulerClient {
    async fn health(&self) -> Result<bool, ClientError> {
        let response = Self::send(self.http.get(self.url("/health"))).await?;
        Ok(Self::decode::<Health>(response).await?.ok)
    }

    async fn list_queues(&self) -> Result<Vec<QueueSummary>, ClientError> {
        let response = Self::send(self.http.get(self.url("/queues"))).await?;
        Self::decode(response).await
    }

    async fn pop(
        &self,
        queue_id: &str,
        filters: Option<&FilterRequest>,
        limit: usize,
    ) -> Result<Vec<Task>, ClientError> {
        let limit = limit.max(1);
        let mut request = self
            .http
            .post(self.url(&format!("/queues/{queue_id}/pop")))
            .query(&[("limit", limit)]);
        request = match filters {
            Some(filters) => request.json(filters),
            None => request.json(&FilterRequest::All(Vec::new())),
        };
        let response = Self::send(request).await?;
        if limit == 1 {
            let task: Option<Task> = Self::decode(response).await?;
            return Ok(task.into_iter().collect());
        }
        Self::decode(response).await
    }

    async fn push(&self, task: &Task) -> Result<Task, ClientError> {
        let url = self.url(&format!("/queues/{}/push", task.queue_id));
        let response = Self::send(self.http.post(url).json(task)).await?;
        Self::decode(response).await
    }

    async fn patch_status(&self, task_id: Uuid, status: TaskStatus) -> Result<Task, ClientError> {
        let url = self.url(&format!("/tasks/{task_id}"));
        let response = Self::send(self.http.patch(url).json(&StatusPatch { status })).await?;
        Self::decode(response).await
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Task, ClientError> {
        let response = Self::send(self.http.get(self.url(&format!("/tasks/{task_id}")))).await?;
        Self::decode(response).await
    }
}
