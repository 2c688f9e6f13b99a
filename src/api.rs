//! Backend REST contract and its HTTP implementation.
//!
//! DESIGN
//! ======
//! `YardBackend` is the seam between the sync layer and the backend. The
//! snapshot loader and dispatcher only see the trait, so tests substitute an
//! in-memory backend and the binaries inject `HttpBackend`.
//!
//! ERROR HANDLING
//! ==============
//! Any non-2xx status is an error carrying the raw body. A 2xx body that is
//! not JSON is also an error; acknowledgments are otherwise opaque.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::coil::{AssignTask, CoilRecord, NewCoil, TaskRecord};
use crate::config::YardConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Backend operations used by the client.
#[async_trait]
pub trait YardBackend: Send + Sync {
    /// `GET /coils`, newest first.
    async fn fetch_coils(&self) -> Result<Vec<CoilRecord>, ApiError>;

    /// `POST /assign_task`. The returned body is informational only.
    async fn assign_task(&self, task: &AssignTask) -> Result<Value, ApiError>;

    /// `GET /tasks`, newest first.
    async fn fetch_tasks(&self) -> Result<Vec<TaskRecord>, ApiError>;

    /// `POST /add_coil`.
    async fn add_coil(&self, coil: &NewCoil) -> Result<Value, ApiError>;
}

// =============================================================================
// HTTP BACKEND
// =============================================================================

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Build a client with the configured request and connect timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Http`] if the TLS backend cannot be initialized.
    pub fn new(config: &YardConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()?;
        Ok(Self { client, base_url: config.base_url.clone() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "api: response");

        if !status.is_success() {
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl YardBackend for HttpBackend {
    async fn fetch_coils(&self) -> Result<Vec<CoilRecord>, ApiError> {
        let value = self.send_json(self.client.get(self.url("/coils"))).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn assign_task(&self, task: &AssignTask) -> Result<Value, ApiError> {
        self.send_json(self.client.post(self.url("/assign_task")).json(task)).await
    }

    async fn fetch_tasks(&self) -> Result<Vec<TaskRecord>, ApiError> {
        let value = self.send_json(self.client.get(self.url("/tasks"))).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn add_coil(&self, coil: &NewCoil) -> Result<Value, ApiError> {
        self.send_json(self.client.post(self.url("/add_coil")).json(coil)).await
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
