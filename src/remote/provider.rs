//! Remote provider contract

use std::sync::Arc;

use async_trait::async_trait;

use crate::inference::image::ImagePayload;

/// What the provider should answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
}

/// One prompt, optionally with an image attached
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub instruction: String,
    pub image: Option<Arc<ImagePayload>>,
    pub format: ResponseFormat,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out")]
    Timeout,
    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("provider returned no content")]
    EmptyResponse,
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response does not match schema: {0}")]
    Schema(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Why a provider was not called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    RateLimited,
    NotConfigured,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::RateLimited => f.write_str("rate limited"),
            SkipReason::NotConfigured => f.write_str("not configured"),
        }
    }
}

/// Result of offering one task to one provider
#[derive(Debug)]
pub enum ProviderOutcome<T> {
    Ok(T),
    Skipped(SkipReason),
    Failed(ProviderError),
}

/// A remote vision-language service
#[async_trait]
pub trait RemoteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// False when no credential is available
    fn is_configured(&self) -> bool;

    /// Send the request and return the model's raw text answer
    async fn complete(&self, request: &RemoteRequest) -> Result<String, ProviderError>;
}

/// Keep error bodies short enough for a log line
pub(crate) fn truncate_body(body: String) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body;
    }
    let mut cut = MAX;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}
