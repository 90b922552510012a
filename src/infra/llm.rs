//! OpenAI-compatible chat completions client.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    application::analysis::{CompletionClient, CompletionError, CompletionRequest},
    config::LlmSettings,
};

use super::{
    error::InfraError,
    telemetry::{METRIC_COMPLETION_LATENCY_MS, METRIC_COMPLETION_RETRIES},
};

const COMPLETIONS_PATH: &str = "/chat/completions";
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct OpenAiCompletionClient {
    http: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_attempts: u32,
    retry_backoff: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompletionClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, InfraError> {
        let api_key = settings.api_key.clone().ok_or_else(|| {
            InfraError::configuration(
                "llm.api_key is not set (configure it or export OPENAI_API_KEY)",
            )
        })?;

        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("introspector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| InfraError::completion(format!("failed to build client: {err}")))?;

        Ok(Self {
            http,
            endpoint: format!("{}{COMPLETIONS_PATH}", settings.api_base),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens.get(),
            max_attempts: settings.max_attempts.get(),
            retry_backoff: settings.retry_backoff,
        })
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CompletionError::Transport(err.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let decoded: ChatResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Decode(err.to_string()))?;

        decoded
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::Empty)
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff.saturating_mul(factor)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let started = Instant::now();
        let result = self.complete_with_retries(&request).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        histogram!(METRIC_COMPLETION_LATENCY_MS, "outcome" => outcome)
            .record(started.elapsed().as_secs_f64() * 1000.0);
        result
    }

    fn model(&self) -> &str {
        &self.model
    }
}

impl OpenAiCompletionClient {
    async fn complete_with_retries(
        &self,
        request: &CompletionRequest,
    ) -> Result<String, CompletionError> {
        let mut attempt = 1;
        loop {
            match self.send_once(request).await {
                Ok(content) => {
                    debug!(
                        target = "introspector::llm",
                        attempt,
                        chars = content.len(),
                        "completion received"
                    );
                    return Ok(content);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        target = "introspector::llm",
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient completion failure; retrying"
                    );
                    counter!(METRIC_COMPLETION_RETRIES).increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
