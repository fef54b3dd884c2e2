//! Domain layer - Core business logic and entities

pub mod error;
pub mod llm;
pub mod retrieval;
pub mod retry;
pub mod workflow;

pub use error::DomainError;
pub use llm::{
    FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message, MessageRole,
    StreamChunk, Usage,
};
pub use retrieval::{ContentRetriever, RelevantContent, ResourceId, ResourceStore};
pub use retry::{RetryExecutor, RetryPolicy};
pub use workflow::{ChatTurn, WorkflowFrame, WorkflowOrchestrator};
