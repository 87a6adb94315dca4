//! OpenAI-compatible chat-completion client
//!
//! Retries transient API errors with exponential backoff and jitter (sleep
//! capped at 30 s, attempts capped by configuration). Authentication errors
//! are never retried. On exhaustion the client degrades to a sentinel error
//! string in `content` so the agent loop can proceed to its own error branch
//! instead of unwinding.

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::agent::types::*;
use backoff::ExponentialBackoff;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Stop sequence used in the textual tool protocol: the model must not
/// pre-empt the tool response.
pub const OBS_START: &str = "<tool_response>";
/// Closing delimiter of an injected tool observation.
pub const OBS_END: &str = "</tool_response>";

/// Sentinel returned in `content` when every retry attempt failed.
pub const LLM_FAILURE_SENTINEL: &str = "Error: LLM server failed after all retries.";

/// One parsed chat-completion reply
#[derive(Debug, Clone, Default)]
pub struct LlmReply {
    /// Assistant text content (sentinel string on total failure)
    pub content: String,
    /// Reasoning/thinking content, when the model exposes it
    pub reasoning: Option<String>,
    /// Native tool calls, when requested and produced
    pub tool_calls: Vec<AssistantToolCall>,
}

impl LlmReply {
    /// Whether the reply is the degraded failure sentinel.
    pub fn is_failure(&self) -> bool {
        self.content == LLM_FAILURE_SENTINEL
    }
}

/// Chat-completion client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new client from configuration
    pub fn new(config: LlmConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
                .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(LlmClient { client, config })
    }

    /// The configured main model
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// The configured summarizer model (visit tool)
    pub fn summary_model(&self) -> &str {
        &self.config.summary_model
    }

    /// Complete with the main model.
    ///
    /// `stop` is usually `[OBS_START]` for the textual protocol; pass an empty
    /// slice for synthesis calls. `tools` switches the request to native
    /// function calling.
    pub async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        stop: &[String],
        tools: Option<&[ToolDefinition]>,
    ) -> LlmReply {
        self.complete_with_model(&self.config.model.clone(), messages, options, stop, tools)
            .await
    }

    /// Complete with a specific model
    pub async fn complete_with_model(
        &self,
        model: &str,
        messages: &[Message],
        options: &GenerationOptions,
        stop: &[String],
        tools: Option<&[ToolDefinition]>,
    ) -> LlmReply {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature: Some(options.temperature),
            top_p: Some(options.top_p),
            presence_penalty: options.presence_penalty,
            max_tokens: options.max_tokens,
            stop: if stop.is_empty() {
                None
            } else {
                Some(stop.to_vec())
            },
            tools: tools.map(|t| t.to_vec()),
            thinking: self
                .config
                .thinking_mode
                .as_ref()
                .map(|mode| ThinkingMode { mode: mode.clone() }),
        };

        let attempts = AtomicU32::new(0);
        let max_retries = self.config.max_retries.max(1);

        let policy = ExponentialBackoff {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let outcome = backoff::future::retry(policy, || {
            let request = request.clone();
            let attempts = &attempts;
            async move {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                match self.send_request(&request).await {
                    Ok(reply) => Ok(reply),
                    Err(e) => {
                        let give_up = !e.is_retryable() || attempt >= max_retries;
                        warn!("LLM call attempt {}/{} failed: {}", attempt, max_retries, e);
                        if give_up {
                            Err(backoff::Error::permanent(e))
                        } else {
                            Err(backoff::Error::transient(e))
                        }
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(reply) => reply,
            Err(e) => {
                warn!("All LLM retry attempts exhausted: {}", e);
                LlmReply {
                    content: LLM_FAILURE_SENTINEL.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    /// Send one chat-completion request and parse the first choice
    async fn send_request(&self, request: &ChatCompletionRequest) -> Result<LlmReply> {
        let url = format!("{}/chat/completions", self.config.base_url);

        debug!("Sending chat completion: model={}", request.model);

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => Error::Unauthorized("Invalid API key".to_string()),
                429 => Error::RateLimit(error_text),
                _ => Error::Llm(format!("API error ({}): {}", status, error_text)),
            });
        }

        let body = response.json::<ChatCompletionResponse>().await?;
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Llm("Response contained no choices".to_string()))?;

        let content = choice
            .message
            .content
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        let tool_calls = choice.message.tool_calls.unwrap_or_default();

        if content.is_empty() && tool_calls.is_empty() {
            // Empty replies are treated as transient and retried.
            return Err(Error::Llm("Empty response received".to_string()));
        }

        Ok(LlmReply {
            content,
            reasoning: choice
                .message
                .reasoning_content
                .filter(|r| !r.trim().is_empty()),
            tool_calls,
        })
    }
}
