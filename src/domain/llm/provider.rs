use async_trait::async_trait;
use std::fmt::Debug;
use std::pin::Pin;
use futures::Stream;

use super::{LlmRequest, LlmResponse};
use super::response::StreamChunk;
use crate::domain::DomainError;

/// Stream type for LLM responses
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, DomainError>> + Send>>;

/// Trait for LLM providers (OpenAI, Anthropic, etc.)
#[async_trait]
pub trait LlmProvider: Send + Sync + Debug {
    /// Send a chat completion request.
    ///
    /// When the request carries a JSON schema response format the returned
    /// content is a JSON document following that schema.
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError>;

    /// Send a streaming chat completion request
    async fn chat_stream(
        &self,
        model: &str,
        request: LlmRequest,
    ) -> Result<LlmStream, DomainError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}
