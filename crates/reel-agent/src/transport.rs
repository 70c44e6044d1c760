//! Transport abstraction for running agents

use std::{pin::Pin, sync::Arc, time::Duration};

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reel_ai::providers::LlmProvider;
use reel_ai::stream::MessageEvent;
use reel_ai::{Context, Model, Result, StreamOptions};
use tokio_stream::Stream;

use crate::events::AgentEvent;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    /// No retries: a failed request ends the run unless configured otherwise
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Whether a stream error message describes a failure worth retrying:
/// rate limits, server errors and dropped connections.
fn is_transient_failure(message: &str) -> bool {
    let message = message.to_lowercase();
    ["429", "500", "502", "503", "504"]
        .iter()
        .any(|code| message.contains(&format!("http {}", code)))
        || message.contains("rate limit")
        || message.contains("too many requests")
        || message.contains("overloaded")
        || message.contains("timeout")
        || message.contains("timed out")
        || message.contains("connection")
}

/// Configuration for one model turn
#[derive(Debug, Clone)]
pub struct AgentRunConfig {
    /// System prompt
    pub system_prompt: Option<String>,
    /// Available tools (as API definitions)
    pub tools: Vec<reel_ai::Tool>,
    /// Model to use
    pub model: Model,
    /// Sampling and tool selection options
    pub options: StreamOptions,
}

/// A stream of agent events
pub type AgentEventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// Transport for running agent interactions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request one model turn over `messages`, streaming events.
    ///
    /// The stream ends with `TurnEnd` on success or `Error` on failure.
    async fn run(
        &self,
        messages: Vec<reel_ai::Message>,
        config: &AgentRunConfig,
    ) -> Result<AgentEventStream>;
}

/// Direct provider transport - calls the LLM API directly
pub struct ProviderTransport {
    provider: Arc<dyn LlmProvider>,
    retry_config: RetryConfig,
}

impl ProviderTransport {
    /// Create a new provider transport
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }
}

#[async_trait]
impl Transport for ProviderTransport {
    async fn run(
        &self,
        messages: Vec<reel_ai::Message>,
        config: &AgentRunConfig,
    ) -> Result<AgentEventStream> {
        let context = Context {
            system_prompt: config.system_prompt.clone(),
            messages,
            tools: config.tools.clone(),
        };

        let provider = self.provider.clone();
        let model = config.model.clone();
        let options = config.options.clone();
        let retry_config = self.retry_config.clone();

        let event_stream: AgentEventStream = Box::pin(stream! {
            // Retry loop. A stream whose first event is a transient error
            // (429, 5xx, dropped connection) counts as a failed request.
            let mut attempt = 0u32;
            let (message_stream, first_event) = loop {
                let error_msg = match provider.stream(&model, &context, &options).await {
                    Ok(mut s) => match s.next().await {
                        Some(MessageEvent::Error { message }) if is_transient_failure(&message) => {
                            message
                        }
                        first => break (s, first),
                    },
                    Err(e) if e.is_retryable() => e.to_string(),
                    Err(e) => {
                        yield AgentEvent::Error { message: e.to_string() };
                        return;
                    }
                };

                if attempt < retry_config.max_retries {
                    let delay = retry_config.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        retry_config.max_retries + 1,
                        error_msg,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    continue;
                }

                yield AgentEvent::Error { message: error_msg };
                return;
            };

            let mut message_stream = futures::stream::iter(first_event).chain(message_stream);
            let mut final_message = None;
            let mut final_usage = reel_ai::Usage::default();

            while let Some(event) = message_stream.next().await {
                match event {
                    MessageEvent::Start { message } => {
                        yield AgentEvent::MessageStart { message };
                    }
                    MessageEvent::Done { message, usage, .. } => {
                        final_message = Some(message.clone());
                        final_usage = usage;
                        yield AgentEvent::MessageEnd { message };
                    }
                    MessageEvent::Error { message } => {
                        yield AgentEvent::Error { message };
                        return;
                    }
                    MessageEvent::TextDelta { .. }
                    | MessageEvent::ToolCallStart { .. }
                    | MessageEvent::ToolCallDelta { .. } => {}
                }
            }

            match final_message {
                Some(msg) => {
                    yield AgentEvent::TurnEnd {
                        message: msg,
                        usage: final_usage,
                    };
                }
                None => {
                    yield AgentEvent::Error {
                        message: "model stream ended without a final message".to_string(),
                    };
                }
            }
        });

        Ok(event_stream)
    }
}
