//! LLM Provider implementations

pub mod openai;

use crate::{Context, MessageEventStream, Model, Result, StreamOptions};
use async_trait::async_trait;

pub use openai::OpenAIProvider;

/// Trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stream a response from the LLM
    async fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<MessageEventStream>;
}
