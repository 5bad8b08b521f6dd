//! REST implementation of [`AbiquoApi`] over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::error::{ApiError, Result};
use crate::traits::AbiquoApi;
use crate::types::*;

/// Connection settings for an Abiquo server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the API, e.g. `https://abiquo.example.com/api`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost/api".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ApiError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.username.is_empty() {
            return Err(ApiError::InvalidConfig("username must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ApiError::InvalidConfig("timeout_secs must be greater than 0".to_string()));
        }
        Ok(())
    }
}

/// HTTP client for the Abiquo API.
pub struct AbiquoClient {
    endpoint: String,
    username: String,
    password: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for AbiquoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbiquoClient")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl AbiquoClient {
    /// Create a new client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username,
            password: config.password,
            http_client,
        })
    }

    /// Fetch a task given its href, absolute or relative to the endpoint.
    pub async fn get_task_by_href(&self, href: &str) -> Result<AsyncTask> {
        self.get_json(href, TASK_MEDIA_TYPE).await
    }

    /// Turn an href into an absolute URL.
    fn resolve(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{}/{}", self.endpoint, href.trim_start_matches('/'))
        }
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn get_json<T: DeserializeOwned>(&self, href: &str, media_type: &str) -> Result<T> {
        let url = self.resolve(href);
        debug!(url = %url, "GET");

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, media_type)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %url, status = %status, "Request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl AbiquoApi for AbiquoClient {
    async fn get_task(&self, task: &AsyncTask) -> Result<AsyncTask> {
        let link = task.self_link().ok_or_else(|| ApiError::MissingLink {
            resource: format!("task {}", task.task_id),
            rel: REL_SELF.to_string(),
        })?;
        self.get_json(&link.href, TASK_MEDIA_TYPE).await
    }

    async fn get_virtual_machine_state(&self, vm: &VirtualMachine) -> Result<VirtualMachineState> {
        let link = vm.self_link().ok_or_else(|| ApiError::MissingLink {
            resource: format!("virtual machine {}", vm.id),
            rel: REL_SELF.to_string(),
        })?;
        let href = format!("{}/state", link.href.trim_end_matches('/'));
        let dto: VirtualMachineStateDto = self.get_json(&href, VM_STATE_MEDIA_TYPE).await?;
        Ok(dto.state)
    }

    async fn list_tasks(&self, owner_href: &str) -> Result<Vec<AsyncTask>> {
        let href = format!("{}/tasks", owner_href.trim_end_matches('/'));
        let tasks: AsyncTasks = self.get_json(&href, TASKS_MEDIA_TYPE).await?;
        Ok(tasks.collection)
    }
}
