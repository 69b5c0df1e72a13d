//! Outbound command transport
//!
//! Commands are POSTed to the agent's command server as the hex text of
//! their JSON. The HTTP reply is only a transport acknowledgement; the real
//! answer to a traced command arrives later on the event listener.

use crate::{CorrelationRegistry, HookwireError, Result};
use hookwire_proto::{encode, Command};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Sends commands to agents and optionally waits for their correlated answer
#[derive(Clone)]
pub struct CommandChannel {
    /// HTTP client reused across requests
    client: reqwest::Client,
    /// Command server base URL
    base_url: String,
    /// Shared correlation registry
    correlation: Arc<CorrelationRegistry>,
    /// Wait used when the caller gives none
    default_timeout: Duration,
    /// Limit on each HTTP exchange, independent of correlation waits
    request_timeout: Duration,
}

impl CommandChannel {
    /// Create a channel for the command server at `base_url`
    pub fn new(
        base_url: impl Into<String>,
        correlation: Arc<CorrelationRegistry>,
        default_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HookwireError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            correlation,
            default_timeout,
            request_timeout,
        })
    }

    /// Command server base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Default correlation timeout
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// HTTP timeout applied to each command server request
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send a command to one agent and return the transport acknowledgement
    pub async fn send(&self, client_id: u64, command: &Command) -> Result<Value> {
        let body = encode(command)?;
        debug!("Sending command type {} to client {} (trace {:?})", command.code, client_id, command.trace);
        self.post(&format!("/api/client/{}", client_id), Some(body)).await
    }

    /// Send a command and wait for the agent's correlated response
    ///
    /// A trace id is generated when the command has none. Returns the
    /// response `data`, or `None` when nothing arrived within `timeout`
    /// (the configured default when unset). Dropping the returned future
    /// withdraws the request.
    pub async fn send_and_wait(&self, client_id: u64, mut command: Command, timeout: Option<Duration>) -> Result<Option<Value>> {
        let trace = command
            .trace
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let request = serde_json::to_value(&command)?;
        let pending = self.correlation.register(trace, command.code, request).await?;

        if let Err(e) = self.send(client_id, &command).await {
            self.correlation.abandon(pending).await;
            return Err(e);
        }

        self.correlation.wait(pending, timeout.unwrap_or(self.default_timeout)).await
    }

    /// Version of the hooked application
    pub async fn version(&self) -> Result<Value> {
        self.post("/api/get_wechat_version", None).await
    }

    /// Launch a new application instance
    pub async fn open(&self) -> Result<Value> {
        self.post("/api/open", None).await
    }

    /// Inject into a running process
    pub async fn inject(&self, pid: u32) -> Result<Value> {
        self.post(&format!("/api/inject/{}", pid), None).await
    }

    /// Tear down the command server's hooks
    pub async fn destroy(&self) -> Result<Value> {
        // Path spelling is what the command server expects
        self.post("/api/destory", None).await
    }

    async fn post(&self, path: &str, body: Option<String>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.post(&url).timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }
}
