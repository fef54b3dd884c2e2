//! Step executor - runs a single workflow step against the routed model

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::{stream, Stream, StreamExt};
use metrics::counter;
use tracing::{debug, debug_span, warn, Instrument};

use super::{ChatTurn, StepContext};
use crate::domain::llm::{FinishReason, LlmProvider, LlmRequest, LlmStream, Message};
use crate::domain::retrieval::{ContentRetriever, RelevantContent};
use crate::domain::retry::{RetryExecutor, RetryLabel};
use crate::domain::DomainError;

const INTERMEDIATE_INSTRUCTIONS: &str = "You are working through one step of a larger plan. \
Use the context gathered by the previous steps and complete only the current step. \
Answer concisely with the facts the following steps will need.";

const FINAL_INSTRUCTIONS: &str = "You are completing the final step of a plan. \
Use the context gathered by the previous steps to write the complete answer for the user.";

const CONVERSATION_INSTRUCTIONS: &str = "You are a helpful assistant. \
Answer the user's latest message using the conversation so far.";

/// A provider paired with the model it should be asked for
#[derive(Debug, Clone)]
pub struct ModelBinding {
    pub provider: Arc<dyn LlmProvider>,
    pub model: String,
}

impl ModelBinding {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Which provider serves a turn. Resolved once per request from the attachment flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRoute {
    WithAttachment,
    TextOnly,
}

impl ProviderRoute {
    pub fn for_turn(turn: &ChatTurn) -> Self {
        if turn.has_attachment() {
            Self::WithAttachment
        } else {
            Self::TextOnly
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WithAttachment => "with_attachment",
            Self::TextOnly => "text_only",
        }
    }
}

/// Whether a step feeds later steps or produces the user-facing answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Intermediate,
    Final,
}

impl StepMode {
    fn instructions(&self) -> &'static str {
        match self {
            Self::Intermediate => INTERMEDIATE_INSTRUCTIONS,
            Self::Final => FINAL_INSTRUCTIONS,
        }
    }
}

/// Everything one step invocation reads
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub index: usize,
    pub description: &'a str,
    pub context: &'a StepContext,
    pub turn: &'a ChatTurn,
}

/// Item of a streamed step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStreamEvent {
    Token(String),
    /// Emitted once, after the provider stream is fully drained
    Finished,
}

pub type StepTokenStream =
    Pin<Box<dyn Stream<Item = Result<StepStreamEvent, DomainError>> + Send>>;

/// Executes workflow steps on one of two model bindings.
///
/// Turns carrying an attachment go to the document binding with the full
/// history; everything else goes to the text binding with a synthesized
/// prompt. Every model call runs under the retry executor. For streamed calls
/// only opening the stream is retried.
#[derive(Clone)]
pub struct StepExecutor {
    text: ModelBinding,
    document: ModelBinding,
    retry: RetryExecutor,
    retriever: Option<Arc<dyn ContentRetriever>>,
}

impl fmt::Debug for StepExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepExecutor")
            .field("text", &self.text)
            .field("document", &self.document)
            .field("retry", &self.retry)
            .field("retriever", &self.retriever.is_some())
            .finish()
    }
}

impl StepExecutor {
    pub fn new(text: ModelBinding, document: ModelBinding, retry: RetryExecutor) -> Self {
        Self {
            text,
            document,
            retry,
            retriever: None,
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn ContentRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn binding(&self, route: ProviderRoute) -> &ModelBinding {
        match route {
            ProviderRoute::WithAttachment => &self.document,
            ProviderRoute::TextOnly => &self.text,
        }
    }

    /// Run an intermediate step to completion and return its full text
    pub async fn complete_step(&self, input: StepInput<'_>) -> Result<String, DomainError> {
        let route = ProviderRoute::for_turn(input.turn);
        let binding = self.binding(route);
        let relevant = self.relevant_content(input.description, input.turn).await;
        let request = build_step_request(route, &input, StepMode::Intermediate, &relevant);

        debug!(
            step = input.index,
            route = route.as_str(),
            provider = binding.provider.provider_name(),
            model = %binding.model,
            "Executing intermediate step"
        );
        counter!("workflow_steps_total", "mode" => "intermediate").increment(1);

        let provider = binding.provider.as_ref();
        let model = binding.model.as_str();
        let response = self
            .retry
            .execute(RetryLabel::Step, move || provider.chat(model, request.clone()))
            .instrument(debug_span!("step_call", step = input.index))
            .await?;

        if response.is_truncated() {
            warn!(step = input.index, finish_reason = ?response.finish_reason, "Step output was truncated");
        }

        Ok(response.content().unwrap_or_default().to_string())
    }

    /// Open the final step's stream
    pub async fn stream_step(&self, input: StepInput<'_>) -> Result<StepTokenStream, DomainError> {
        let route = ProviderRoute::for_turn(input.turn);
        let relevant = self.relevant_content(input.description, input.turn).await;
        let request = build_step_request(route, &input, StepMode::Final, &relevant);

        debug!(
            step = input.index,
            route = route.as_str(),
            "Streaming final step"
        );
        counter!("workflow_steps_total", "mode" => "final").increment(1);

        self.open_stream(route, RetryLabel::Final, request)
            .instrument(debug_span!("step_call", step = input.index))
            .await
    }

    /// Stream a plain conversational reply to the turn
    pub async fn stream_conversation(&self, turn: &ChatTurn) -> Result<StepTokenStream, DomainError> {
        let route = ProviderRoute::for_turn(turn);
        let query = turn.latest_user_input().unwrap_or_default();
        let relevant = self.relevant_content(query, turn).await;

        let mut system = CONVERSATION_INSTRUCTIONS.to_string();
        if !relevant.is_empty() {
            system.push_str("\n\n");
            system.push_str(&relevant_section(&relevant));
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(turn.messages_with_attachment());
        let request = LlmRequest::builder().messages(messages).stream(true).build();

        self.open_stream(route, RetryLabel::Conversation, request).await
    }

    async fn open_stream(
        &self,
        route: ProviderRoute,
        label: RetryLabel,
        request: LlmRequest,
    ) -> Result<StepTokenStream, DomainError> {
        let binding = self.binding(route);
        let provider = binding.provider.as_ref();
        let model = binding.model.as_str();

        let stream = self
            .retry
            .execute(label, move || provider.chat_stream(model, request.clone()))
            .await?;

        Ok(into_step_stream(stream))
    }

    /// Retrieval failures degrade to no extra content
    async fn relevant_content(&self, query: &str, turn: &ChatTurn) -> Vec<RelevantContent> {
        let (Some(retriever), Some(resource_id)) = (&self.retriever, &turn.resource_id) else {
            return Vec::new();
        };

        match retriever.find_relevant_content(query, resource_id).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    resource_id = %resource_id,
                    error = %e,
                    "Content retrieval failed, continuing without it"
                );
                Vec::new()
            }
        }
    }
}

fn into_step_stream(stream: LlmStream) -> StepTokenStream {
    let tokens = stream.filter_map(|chunk| async move {
        match chunk {
            Ok(chunk) => {
                if chunk.finish_reason.is_some_and(FinishReason::is_truncated) {
                    warn!(finish_reason = ?chunk.finish_reason, "Streamed output was truncated");
                }
                chunk
                    .delta
                    .filter(|delta| !delta.is_empty())
                    .map(|delta| Ok(StepStreamEvent::Token(delta)))
            }
            Err(e) => Some(Err(e)),
        }
    });

    Box::pin(tokens.chain(stream::once(async { Ok(StepStreamEvent::Finished) })))
}

fn relevant_section(relevant: &[RelevantContent]) -> String {
    let mut section = String::from("Relevant content:\n");
    for item in relevant {
        section.push_str("- ");
        section.push_str(item.content.trim());
        section.push('\n');
    }
    section
}

fn step_prompt(input: &StepInput<'_>, relevant: &[RelevantContent]) -> String {
    let mut prompt = format!("Context:\n{}\n\n", input.context.render());

    if !relevant.is_empty() {
        prompt.push_str(&relevant_section(relevant));
        prompt.push('\n');
    }

    prompt.push_str("Current step: ");
    prompt.push_str(input.description);
    prompt
}

/// Text-only steps get a synthesized prompt; attachment steps keep the full
/// history and carry the step in the system message.
pub fn build_step_request(
    route: ProviderRoute,
    input: &StepInput<'_>,
    mode: StepMode,
    relevant: &[RelevantContent],
) -> LlmRequest {
    let prompt = step_prompt(input, relevant);
    let streaming = mode == StepMode::Final;

    match route {
        ProviderRoute::TextOnly => LlmRequest::builder()
            .system(mode.instructions())
            .user(prompt)
            .stream(streaming)
            .build(),
        ProviderRoute::WithAttachment => {
            let mut messages = vec![Message::system(format!(
                "{}\n\n{}",
                mode.instructions(),
                prompt
            ))];
            messages.extend(input.turn.messages_with_attachment());

            LlmRequest::builder()
                .messages(messages)
                .stream(streaming)
                .build()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{ContentPart, MessageRole, MockLlmProvider, MockReply};
    use crate::domain::retrieval::{MockContentRetriever, ResourceId};
    use crate::domain::retry::RetryPolicy;
    use crate::domain::workflow::Attachment;

    fn fast_retry() -> RetryExecutor {
        RetryExecutor::new(
            RetryPolicy::default()
                .with_initial_delay(1)
                .with_max_delay(2)
                .with_jitter(0.0),
        )
    }

    fn executor(text: Arc<MockLlmProvider>, document: Arc<MockLlmProvider>) -> StepExecutor {
        StepExecutor::new(
            ModelBinding::new(text, "gpt-4o-mini"),
            ModelBinding::new(document, "claude-3-5-sonnet"),
            fast_retry(),
        )
    }

    fn turn() -> ChatTurn {
        ChatTurn::new(vec![Message::user("Help me plan my estate")])
    }

    async fn drain(mut stream: StepTokenStream) -> (String, usize, Option<DomainError>) {
        let mut text = String::new();
        let mut finished = 0;
        while let Some(item) = stream.next().await {
            match item {
                Ok(StepStreamEvent::Token(t)) => text.push_str(&t),
                Ok(StepStreamEvent::Finished) => finished += 1,
                Err(e) => return (text, finished, Some(e)),
            }
        }
        (text, finished, None)
    }

    #[test]
    fn test_route_resolution() {
        assert_eq!(ProviderRoute::for_turn(&turn()), ProviderRoute::TextOnly);

        let with_file =
            turn().with_attachment(Attachment::new("will.pdf", "application/pdf", "aGk="));
        assert_eq!(
            ProviderRoute::for_turn(&with_file),
            ProviderRoute::WithAttachment
        );
    }

    #[test]
    fn test_text_only_request_uses_synthesized_prompt() {
        let turn = turn();
        let mut context = StepContext::new();
        context.append("assets: house");
        let input = StepInput {
            index: 1,
            description: "identify beneficiaries",
            context: &context,
            turn: &turn,
        };

        let request = build_step_request(
            ProviderRoute::TextOnly,
            &input,
            StepMode::Intermediate,
            &[],
        );

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert!(!request.stream);
        let prompt = request.messages[1].content_text().unwrap();
        assert_eq!(
            prompt,
            "Context:\nassets: house\n\nCurrent step: identify beneficiaries"
        );
    }

    #[test]
    fn test_empty_context_prompt() {
        let turn = turn();
        let context = StepContext::new();
        let input = StepInput {
            index: 0,
            description: "gather assets",
            context: &context,
            turn: &turn,
        };

        let request = build_step_request(ProviderRoute::TextOnly, &input, StepMode::Final, &[]);
        assert!(request.stream);
        assert_eq!(
            request.messages[1].content_text(),
            Some("Context:\nNone\n\nCurrent step: gather assets")
        );
    }

    #[test]
    fn test_attachment_request_keeps_history() {
        let turn = ChatTurn::new(vec![
            Message::user("hello"),
            Message::assistant("hi"),
            Message::user("summarize the document"),
        ])
        .with_attachment(Attachment::new("will.pdf", "application/pdf", "aGk="));
        let context = StepContext::new();
        let input = StepInput {
            index: 0,
            description: "summarize",
            context: &context,
            turn: &turn,
        };

        let relevant = vec![RelevantContent::new("clause 4: trustees", 0.8)];
        let request = build_step_request(
            ProviderRoute::WithAttachment,
            &input,
            StepMode::Intermediate,
            &relevant,
        );

        assert_eq!(request.messages.len(), 4);
        let system = request.messages[0].content_text().unwrap();
        assert!(system.contains("Current step: summarize"));
        assert!(system.contains("- clause 4: trustees"));

        let parts = request.messages[3].content_parts();
        assert!(matches!(parts[1], ContentPart::Document { .. }));
    }

    #[tokio::test]
    async fn test_complete_step_routes_to_text_provider() {
        let text = Arc::new(MockLlmProvider::new("openai").with_response("assets: house"));
        let document = Arc::new(MockLlmProvider::new("anthropic").with_response("unused"));
        let executor = executor(text.clone(), document.clone());

        let turn = turn();
        let context = StepContext::new();
        let result = executor
            .complete_step(StepInput {
                index: 0,
                description: "gather assets",
                context: &context,
                turn: &turn,
            })
            .await
            .unwrap();

        assert_eq!(result, "assets: house");
        assert_eq!(text.chat_calls(), 1);
        assert_eq!(document.calls(), 0);
    }

    #[tokio::test]
    async fn test_complete_step_routes_attachment_to_document_provider() {
        let text = Arc::new(MockLlmProvider::new("openai").with_response("unused"));
        let document = Arc::new(MockLlmProvider::new("anthropic").with_response("summary"));
        let executor = executor(text.clone(), document.clone());

        let turn = turn().with_attachment(Attachment::new("a.png", "image/png", "aGk="));
        let context = StepContext::new();
        let result = executor
            .complete_step(StepInput {
                index: 0,
                description: "describe image",
                context: &context,
                turn: &turn,
            })
            .await
            .unwrap();

        assert_eq!(result, "summary");
        assert_eq!(text.calls(), 0);
        assert_eq!(document.chat_calls(), 1);
    }

    #[tokio::test]
    async fn test_complete_step_retries_transient_failures() {
        let text = Arc::new(
            MockLlmProvider::new("openai")
                .then_status(503)
                .then_status(529)
                .then_text("recovered"),
        );
        let document = Arc::new(MockLlmProvider::new("anthropic"));
        let executor = executor(text.clone(), document);

        let turn = turn();
        let context = StepContext::new();
        let result = executor
            .complete_step(StepInput {
                index: 0,
                description: "gather assets",
                context: &context,
                turn: &turn,
            })
            .await
            .unwrap();

        assert_eq!(result, "recovered");
        assert_eq!(text.chat_calls(), 3);
    }

    #[tokio::test]
    async fn test_stream_step_emits_finished_once() {
        let text = Arc::new(MockLlmProvider::new("openai").with_response("Your estate plan"));
        let document = Arc::new(MockLlmProvider::new("anthropic"));
        let executor = executor(text.clone(), document);

        let turn = turn();
        let context = StepContext::new();
        let stream = executor
            .stream_step(StepInput {
                index: 2,
                description: "draft plan",
                context: &context,
                turn: &turn,
            })
            .await
            .unwrap();

        let (output, finished, error) = drain(stream).await;
        assert_eq!(output, "Your estate plan");
        assert_eq!(finished, 1);
        assert!(error.is_none());
        assert_eq!(text.stream_calls(), 1);
        assert!(text.requests()[0].stream);
    }

    #[tokio::test]
    async fn test_stream_step_surfaces_mid_stream_failure() {
        let text = Arc::new(
            MockLlmProvider::new("openai").then(MockReply::BrokenStream("partial".to_string())),
        );
        let document = Arc::new(MockLlmProvider::new("anthropic"));
        let executor = executor(text.clone(), document);

        let turn = turn();
        let context = StepContext::new();
        let stream = executor
            .stream_step(StepInput {
                index: 0,
                description: "draft",
                context: &context,
                turn: &turn,
            })
            .await
            .unwrap();

        let (output, finished, error) = drain(stream).await;
        assert_eq!(output, "partial");
        assert_eq!(finished, 0);
        assert!(error.is_some());
        assert_eq!(text.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_open_failure_is_not_retried_when_fatal() {
        let text = Arc::new(MockLlmProvider::new("openai").with_status_error(401));
        let document = Arc::new(MockLlmProvider::new("anthropic"));
        let executor = executor(text.clone(), document);

        let turn = turn();
        let context = StepContext::new();
        let result = executor
            .stream_step(StepInput {
                index: 0,
                description: "draft",
                context: &context,
                turn: &turn,
            })
            .await;

        let Err(err) = result else {
            panic!("expected stream open to fail");
        };
        assert_eq!(err.status_code(), Some(401));
        assert_eq!(text.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_retrieved_content_is_added_to_prompt() {
        let text = Arc::new(MockLlmProvider::new("openai").with_response("ok"));
        let document = Arc::new(MockLlmProvider::new("anthropic"));

        let mut retriever = MockContentRetriever::new();
        retriever
            .expect_find_relevant_content()
            .returning(|_, _| Ok(vec![RelevantContent::new("The house is jointly owned", 0.9)]));

        let executor = executor(text.clone(), document).with_retriever(Arc::new(retriever));

        let turn = turn().with_resource(ResourceId::new("doc-1").unwrap());
        let context = StepContext::new();
        executor
            .complete_step(StepInput {
                index: 0,
                description: "gather assets",
                context: &context,
                turn: &turn,
            })
            .await
            .unwrap();

        let prompt = text.requests()[0].messages[1]
            .content_text()
            .unwrap()
            .to_string();
        assert!(prompt.contains("Relevant content:\n- The house is jointly owned"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_empty() {
        let text = Arc::new(MockLlmProvider::new("openai").with_response("ok"));
        let document = Arc::new(MockLlmProvider::new("anthropic"));

        let mut retriever = MockContentRetriever::new();
        retriever
            .expect_find_relevant_content()
            .returning(|_, _| Err(DomainError::retrieval("index unavailable")));

        let executor = executor(text.clone(), document).with_retriever(Arc::new(retriever));

        let turn = turn().with_resource(ResourceId::new("doc-1").unwrap());
        let context = StepContext::new();
        let result = executor
            .complete_step(StepInput {
                index: 0,
                description: "gather assets",
                context: &context,
                turn: &turn,
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        let prompt = text.requests()[0].messages[1]
            .content_text()
            .unwrap()
            .to_string();
        assert!(!prompt.contains("Relevant content"));
    }

    #[tokio::test]
    async fn test_stream_conversation_passes_history() {
        let text = Arc::new(MockLlmProvider::new("openai").with_response("Hello there"));
        let document = Arc::new(MockLlmProvider::new("anthropic"));
        let executor = executor(text.clone(), document);

        let turn = ChatTurn::new(vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("how are you"),
        ]);
        let stream = executor.stream_conversation(&turn).await.unwrap();
        let (output, finished, _) = drain(stream).await;

        assert_eq!(output, "Hello there");
        assert_eq!(finished, 1);
        let request = &text.requests()[0];
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, MessageRole::System);
    }
}
