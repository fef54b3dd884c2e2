//! Chat service - answers a chat turn directly or through a workflow

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};

use crate::domain::workflow::{
    ChatTurn, FrameSink, FrameStream, StepExecutor, StepStreamEvent, WorkflowError,
    WorkflowOrchestrator,
};

/// How a chat request is answered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Stream a single reply to the conversation
    #[default]
    Default,
    /// Plan steps, run them in order and stream the final one
    Workflow,
}

/// Entry point for chat requests
#[derive(Debug, Clone)]
pub struct ChatService {
    orchestrator: WorkflowOrchestrator,
}

impl ChatService {
    pub fn new(orchestrator: WorkflowOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn respond(&self, mode: ChatMode, turn: ChatTurn) -> FrameStream {
        match mode {
            ChatMode::Workflow => self.orchestrator.run(turn),
            ChatMode::Default => self.converse(turn),
        }
    }

    fn converse(&self, turn: ChatTurn) -> FrameStream {
        let config = self.orchestrator.config();
        let (sink, frames) = FrameSink::channel(config.channel_capacity, false);
        let executor = self.orchestrator.executor().clone();
        let span = info_span!("conversation", run_id = %uuid::Uuid::new_v4());

        tokio::spawn(
            async move {
                if let Err(e) = stream_reply(&executor, &turn, &sink).await {
                    info!(error = %e, "Conversation stopped");
                }
            }
            .instrument(span),
        );

        frames
    }
}

async fn stream_reply(
    executor: &StepExecutor,
    turn: &ChatTurn,
    sink: &FrameSink,
) -> Result<(), WorkflowError> {
    let mut stream = match sink.guard(executor.stream_conversation(turn)).await? {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Conversation failed");
            sink.error(e.to_string()).await;
            return Ok(());
        }
    };

    while let Some(item) = sink.guard(stream.next()).await? {
        match item {
            Ok(StepStreamEvent::Token(text)) => sink.token(text).await?,
            Ok(StepStreamEvent::Finished) => break,
            Err(e) => {
                error!(error = %e, "Conversation stream failed");
                sink.error(e.to_string()).await;
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::llm::{Message, MockLlmProvider};
    use crate::domain::retry::{RetryExecutor, RetryPolicy};
    use crate::domain::workflow::{
        LlmStepPlanner, ModelBinding, OrchestratorConfig, StepExecutor, WorkflowFrame,
    };

    fn service(provider: Arc<MockLlmProvider>) -> ChatService {
        let retry = RetryExecutor::new(RetryPolicy::default().with_initial_delay(1).with_jitter(0.0));
        let binding = ModelBinding::new(provider, "gpt-4o-mini");
        let planner = LlmStepPlanner::new(binding.clone(), retry.clone());
        let executor = StepExecutor::new(binding.clone(), binding, retry);

        ChatService::new(WorkflowOrchestrator::new(
            Arc::new(planner),
            Arc::new(executor),
            OrchestratorConfig::default(),
        ))
    }

    fn turn() -> ChatTurn {
        ChatTurn::new(vec![Message::user("Hello")])
    }

    #[test]
    fn test_mode_names() {
        let mode: ChatMode = serde_json::from_str("\"workflow\"").unwrap();
        assert_eq!(mode, ChatMode::Workflow);
        assert_eq!(ChatMode::default(), ChatMode::Default);
    }

    #[tokio::test]
    async fn test_default_mode_streams_tokens_only() {
        let provider = Arc::new(MockLlmProvider::new("openai").with_response("Hi there friend"));
        let frames: Vec<WorkflowFrame> = service(provider.clone())
            .respond(ChatMode::Default, turn())
            .collect()
            .await;

        assert!(frames.iter().all(|f| matches!(f, WorkflowFrame::Token(_))));
        let text: String = frames
            .iter()
            .filter_map(|f| match f {
                WorkflowFrame::Token(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hi there friend");
        assert_eq!(provider.stream_calls(), 1);
        assert_eq!(provider.chat_calls(), 0);
    }

    #[tokio::test]
    async fn test_default_mode_reports_failure() {
        let provider = Arc::new(MockLlmProvider::new("openai").with_status_error(401));
        let frames: Vec<WorkflowFrame> = service(provider)
            .respond(ChatMode::Default, turn())
            .collect()
            .await;

        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], WorkflowFrame::Error(e) if e.error.contains("401")));
    }

    #[tokio::test]
    async fn test_workflow_mode_emits_progress() {
        let provider = Arc::new(
            MockLlmProvider::new("openai")
                .then_text(r#"{"steps": ["answer"]}"#)
                .then_text("done"),
        );
        let frames: Vec<WorkflowFrame> = service(provider)
            .respond(ChatMode::Workflow, turn())
            .collect()
            .await;

        assert!(matches!(frames.first(), Some(WorkflowFrame::Progress(_))));
        assert!(frames.last().unwrap().is_terminal_progress());
    }
}
