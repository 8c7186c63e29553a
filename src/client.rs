use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::result::EvaluationResult;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EVALUATE_TIMEOUT: Duration = Duration::from_secs(20);
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";
pub const API_BASE_ENV_VAR: &str = "OBLIGRAPH_API_BASE";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{message}")]
    Status { status: StatusCode, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Transport(err)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub ruleset: Value,
}

#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub idempotency_key: Option<String>,
    pub timeout: Duration,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            idempotency_key: None,
            timeout: DEFAULT_EVALUATE_TIMEOUT,
        }
    }
}

/// HTTP client for the rules evaluation service.
#[derive(Debug, Clone)]
pub struct EvaluationClient {
    base: String,
    http: reqwest::Client,
}

impl EvaluationClient {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = self
            .http
            .get(self.url("/api/health/status"))
            .timeout(DEFAULT_TIMEOUT)
            .send()
            .await?;
        let body = read_body(response).await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Posts a business profile for evaluation. Retries with the same
    /// idempotency key are safe on the service side.
    pub async fn evaluate(
        &self,
        profile: &Value,
        options: &EvaluateOptions,
    ) -> Result<EvaluationResult, ClientError> {
        let key = options
            .idempotency_key
            .clone()
            .unwrap_or_else(new_idempotency_key);
        debug!(idempotency_key = %key, "posting profile for evaluation");

        let response = self
            .http
            .post(self.url("/api/evaluate"))
            .header(IDEMPOTENCY_HEADER, key)
            .json(profile)
            .timeout(options.timeout)
            .send()
            .await?;
        let body = read_body(response).await?;
        Ok(EvaluationResult::from_json(&body))
    }
}

pub fn new_idempotency_key() -> String {
    Uuid::new_v4().to_string()
}

async fn read_body(response: reqwest::Response) -> Result<Value, ClientError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        // proxies answer with HTML pages; keep the status either way
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        return Err(ClientError::Status {
            status,
            message: error_message(status, &body),
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Error text the service put in the body, else the status line.
pub fn error_message(status: StatusCode, body: &Value) -> String {
    ["message", "error"]
        .iter()
        .filter_map(|field| body.get(*field).and_then(Value::as_str))
        .find(|message| !message.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
