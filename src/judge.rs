use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::JudgeConfig;
use crate::error::ApiError;

/// Judge0 status id for an accepted run. Ids 1 and 2 are queue/processing,
/// everything from 3 upward is terminal.
const STATUS_ACCEPTED: i64 = 3;

#[derive(Serialize, Debug)]
pub struct JudgeSubmission<'a> {
    pub source_code: &'a str,
    pub language_id: i64,
    pub stdin: &'a str,
    pub expected_output: &'a str,
}

/// Terminal judgment of one code execution against one test case.
#[derive(Serialize, Debug, Clone)]
pub struct Verdict {
    pub status_id: i64,
    pub status: String,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub compile_output: Option<String>,
    /// Elapsed wall time in milliseconds
    pub time_ms: Option<f64>,
    /// Peak memory in kilobytes
    pub memory_kb: Option<i64>,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        self.status_id == STATUS_ACCEPTED
    }

    pub fn is_terminal(&self) -> bool {
        self.status_id >= STATUS_ACCEPTED
    }
}

/// Boundary trait so the grader can be exercised against a scripted double.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Submits one run and returns its opaque token.
    async fn submit(&self, submission: &JudgeSubmission<'_>) -> Result<String, ApiError>;

    /// Fetches a verdict. With `wait` the upstream service blocks until the
    /// run reaches a terminal status or its own deadline expires.
    async fn fetch_result(&self, token: &str, wait: bool) -> Result<Verdict, ApiError>;

    /// Submit-then-wait convenience used by grading and the `/run` endpoint.
    async fn run_case(&self, submission: &JudgeSubmission<'_>) -> Result<Verdict, ApiError> {
        let token = self.submit(submission).await?;
        self.fetch_result(&token, true).await
    }

    /// Connectivity check backing the status endpoint.
    async fn health(&self) -> Result<serde_json::Value, ApiError>;
}

// ---- Wire types for the external service ----

#[derive(Deserialize)]
struct SubmitResponse {
    token: String,
}

#[derive(Deserialize)]
struct RawStatus {
    id: i64,
    description: String,
}

#[derive(Deserialize)]
struct RawVerdict {
    status: RawStatus,
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    /// Judge0 reports time as a decimal-seconds string
    time: Option<serde_json::Value>,
    memory: Option<serde_json::Value>,
}

impl From<RawVerdict> for Verdict {
    fn from(raw: RawVerdict) -> Self {
        let time_ms = raw.time.as_ref().and_then(|v| match v {
            serde_json::Value::String(s) => s.parse::<f64>().ok().map(|secs| secs * 1000.0),
            serde_json::Value::Number(n) => n.as_f64().map(|secs| secs * 1000.0),
            _ => None,
        });
        let memory_kb = raw.memory.as_ref().and_then(|v| match v {
            serde_json::Value::String(s) => s.parse::<i64>().ok(),
            serde_json::Value::Number(n) => n.as_i64(),
            _ => None,
        });

        Verdict {
            status_id: raw.status.id,
            status: raw.status.description,
            stdout: raw.stdout,
            stderr: raw.stderr,
            compile_output: raw.compile_output,
            time_ms,
            memory_kb,
        }
    }
}

/// HTTP client for the external code execution service.
pub struct JudgeClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    api_host: Option<String>,
}

impl JudgeClient {
    pub fn new(config: &JudgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_host: config.api_host.clone(),
        }
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let Some(key) = &self.api_key else {
            return req;
        };
        let host = self
            .api_host
            .as_deref()
            .unwrap_or("judge0-ce.p.rapidapi.com");
        req.header("X-RapidAPI-Key", key)
            .header("X-RapidAPI-Host", host)
    }
}

#[async_trait]
impl Judge for JudgeClient {
    async fn submit(&self, submission: &JudgeSubmission<'_>) -> Result<String, ApiError> {
        let url = format!("{}/submissions", self.api_url);

        let response = self
            .with_auth(self.http.post(&url))
            .json(submission)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                log::error!("Judge submission failed: {e}");
                ApiError::ExternalService("Code execution service unavailable".to_string())
            })?;

        let body: SubmitResponse = response.json().await.map_err(|e| {
            log::error!("Judge returned malformed submission response: {e}");
            ApiError::ExternalService("Code execution service unavailable".to_string())
        })?;

        log::debug!("Submitted run to judge, token {}", body.token);
        Ok(body.token)
    }

    async fn fetch_result(&self, token: &str, wait: bool) -> Result<Verdict, ApiError> {
        let url = format!("{}/submissions/{}", self.api_url, token);
        let timeout = if wait {
            Duration::from_secs(60)
        } else {
            Duration::from_secs(10)
        };

        let mut req = self.with_auth(self.http.get(&url)).timeout(timeout);
        if wait {
            req = req.query(&[("wait", "true")]);
        }

        let response = req
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                log::error!("Fetching judge result {token} failed: {e}");
                ApiError::ExternalService("Failed to get execution results".to_string())
            })?;

        let raw: RawVerdict = response.json().await.map_err(|e| {
            log::error!("Judge returned malformed verdict for {token}: {e}");
            ApiError::ExternalService("Failed to get execution results".to_string())
        })?;

        Ok(raw.into())
    }

    async fn health(&self) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}/languages", self.api_url);

        let response = self
            .with_auth(self.http.get(&url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                log::warn!("Judge health check failed: {e}");
                ApiError::ExternalService("Code execution service unavailable".to_string())
            })?;

        let languages: Vec<serde_json::Value> = response.json().await.map_err(|e| {
            log::warn!("Judge health check returned malformed body: {e}");
            ApiError::ExternalService("Code execution service unavailable".to_string())
        })?;

        Ok(serde_json::json!({
            "status": "connected",
            "api_url": self.api_url,
            "api_key_configured": self.api_key.is_some(),
            "languages_count": languages.len()
        }))
    }
}
