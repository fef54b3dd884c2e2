use serde::{Deserialize, Serialize};

use super::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    /// Output hit the token limit
    Length,
    ContentFilter,
    ToolCalls,
    Error,
}

impl FinishReason {
    /// Generation ended before the model chose to stop
    pub fn is_truncated(self) -> bool {
        matches!(self, Self::Length | Self::ContentFilter)
    }
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Completed (non-streamed) model reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub id: String,
    pub model: String,
    pub message: Message,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl LlmResponse {
    pub fn new(id: String, model: String, message: Message) -> Self {
        Self {
            id,
            model,
            message,
            finish_reason: None,
            usage: None,
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn content(&self) -> Option<&str> {
        self.message.content_text()
    }

    pub fn is_truncated(&self) -> bool {
        self.finish_reason.is_some_and(FinishReason::is_truncated)
    }
}

/// One increment of a streamed reply. The last chunk carries the finish reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub model: String,
    pub delta: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

impl StreamChunk {
    pub fn new(id: String, model: String) -> Self {
        Self {
            id,
            model,
            delta: None,
            finish_reason: None,
        }
    }

    pub fn with_delta(mut self, delta: impl Into<String>) -> Self {
        self.delta = Some(delta.into());
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total() {
        assert_eq!(Usage::new(10, 20).total(), 30);
        assert_eq!(Usage::new(u32::MAX, 1).total(), u32::MAX);
    }

    #[test]
    fn test_truncation() {
        let response = LlmResponse::new(
            "id-123".to_string(),
            "gpt-4o".to_string(),
            Message::assistant("Hello!"),
        );
        assert_eq!(response.content(), Some("Hello!"));
        assert!(!response.is_truncated());

        let response = response.with_finish_reason(FinishReason::Length);
        assert!(response.is_truncated());
        assert!(!FinishReason::Stop.is_truncated());
    }
}
