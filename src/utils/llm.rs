// src/utils/llm.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;

use crate::config::LlmSettings;

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 8_000;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider rate limited the request, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
    #[error("unusable model output: {0}")]
    InvalidOutput(String),
}

/// Anything that can turn a system + user prompt into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenAI-compatible chat-completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    endpoint: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn from_settings(settings: &LlmSettings) -> Result<Self, LlmError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::NotConfigured("LLM_API_KEY"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            api_key,
            model: settings.model.clone(),
            endpoint: format!(
                "{}/chat/completions",
                settings.api_endpoint.trim_end_matches('/')
            ),
            max_retries: settings.max_retries,
            client,
        })
    }
}

/// Delay before retry number `retry` (0-based). A server-provided
/// `Retry-After` wins when it asks for longer than the exponential step.
pub fn backoff_delay(retry: u32, retry_after_secs: Option<u64>) -> Duration {
    let exponential = BASE_BACKOFF_MS
        .saturating_mul(1u64 << retry.min(16))
        .min(MAX_BACKOFF_MS);
    let hinted = retry_after_secs.unwrap_or(0).saturating_mul(1000);
    Duration::from_millis(exponential.max(hinted))
}

fn retry_after_header(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                ChatMessage { role: "system".into(), content: system.into() },
                ChatMessage { role: "user".into(), content: user.into() },
            ],
            "stream": false
        });

        let mut retry = 0;
        loop {
            let resp = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&payload)
                .send()
                .await?;

            let status = resp.status();
            if status.is_success() {
                let parsed: ChatResponse = serde_json::from_slice(&resp.bytes().await?)?;
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .filter(|c| !c.trim().is_empty())
                    .ok_or(LlmError::EmptyChoices);
            }

            // Only rate limits are retried; every other failure is final.
            if status == StatusCode::TOO_MANY_REQUESTS {
                let hinted = retry_after_header(&resp);
                if retry >= self.max_retries {
                    return Err(LlmError::RateLimited {
                        retry_after_secs: hinted.unwrap_or(1),
                    });
                }
                let delay = backoff_delay(retry, hinted);
                tracing::warn!(retry, delay_ms = delay.as_millis() as u64, "LLM provider rate limited, backing off");
                sleep(delay).await;
                retry += 1;
                continue;
            }

            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::HttpStatus { status, body });
        }
    }
}
