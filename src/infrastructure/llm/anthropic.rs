use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http_client::{sse_data_lines, HttpClientTrait};
use crate::domain::llm::ContentPart;
use crate::domain::{
    DomainError, FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message,
    MessageRole, StreamChunk, Usage,
};

const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic API provider.
///
/// Accepts image and document attachments as native content blocks. Structured
/// output is requested through the system prompt since the messages API has no
/// response format parameter.
#[derive(Debug)]
pub struct AnthropicProvider<C: HttpClientTrait> {
    client: C,
    api_key: String,
    base_url: String,
}

impl<C: HttpClientTrait> AnthropicProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_ANTHROPIC_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            api_key: api_key.into(),
            base_url,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_request(&self, model: &str, request: &LlmRequest) -> Value {
        let (system, messages) = split_system_messages(&request.messages);

        let system = match request.json_schema() {
            Some(schema) => {
                let instruction = format!(
                    "Respond only with a JSON document that matches this JSON schema, without any surrounding text:\n{}",
                    schema.schema
                );
                Some(match system {
                    Some(system) => format!("{}\n\n{}", system, instruction),
                    None => instruction,
                })
            }
            None => system,
        };

        let anthropic_messages: Vec<Value> = messages.into_iter().map(message_to_json).collect();

        let mut body = json!({
            "model": model,
            "messages": anthropic_messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": request.stream,
        });

        if let Some(system_content) = system {
            body["system"] = json!(system_content);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        body
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", ANTHROPIC_VERSION),
            ("Content-Type", "application/json"),
        ]
    }

    fn parse_response(&self, json: Value) -> Result<LlmResponse, DomainError> {
        let response: AnthropicResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("anthropic", format!("Failed to parse response: {}", e))
        })?;

        let content = response
            .content
            .into_iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        let llm_response = LlmResponse::new(response.id, response.model, Message::assistant(content))
            .with_finish_reason(parse_stop_reason(response.stop_reason.as_deref()))
            .with_usage(Usage::new(
                response.usage.input_tokens,
                response.usage.output_tokens,
            ));

        Ok(llm_response)
    }
}

#[async_trait]
impl<C: HttpClientTrait> LlmProvider for AnthropicProvider<C> {
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        let mut req = request;
        req.stream = false;

        let url = self.messages_url();
        let body = self.build_request(model, &req);
        let response = self.client.post_json(&url, self.headers(), &body).await?;

        self.parse_response(response)
    }

    async fn chat_stream(
        &self,
        model: &str,
        request: LlmRequest,
    ) -> Result<LlmStream, DomainError> {
        let mut req = request;
        req.stream = true;

        let url = self.messages_url();
        let body = self.build_request(model, &req);
        let byte_stream = self
            .client
            .post_json_stream(&url, self.headers(), &body)
            .await?;

        let model = model.to_string();
        let stream = sse_data_lines(byte_stream).filter_map(move |line| {
            let chunk = line.and_then(|data| parse_stream_event(&data, &model)).transpose();
            async move { chunk }
        });

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

/// Events without text or a stop reason map to `None`
fn parse_stream_event(data: &str, model: &str) -> Result<Option<StreamChunk>, DomainError> {
    let event: AnthropicStreamEvent = serde_json::from_str(data).map_err(|e| {
        DomainError::provider("anthropic", format!("Failed to parse stream event: {}", e))
    })?;

    let chunk = || StreamChunk::new(String::new(), model.to_string());

    match event.event_type.as_str() {
        "content_block_delta" => Ok(event
            .delta
            .filter(|delta| delta.delta_type == "text_delta")
            .and_then(|delta| delta.text)
            .map(|text| chunk().with_delta(text))),
        "message_delta" => Ok(event
            .delta
            .and_then(|delta| delta.stop_reason)
            .map(|reason| chunk().with_finish_reason(parse_stop_reason(Some(&reason))))),
        "message_stop" => Ok(Some(chunk().with_finish_reason(FinishReason::Stop))),
        "error" => {
            let message = event
                .error
                .map(|e| format!("{}: {}", e.error_type, e.message))
                .unwrap_or_else(|| "stream error".to_string());
            Err(DomainError::provider("anthropic", message))
        }
        _ => Ok(None),
    }
}

fn parse_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn split_system_messages(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let mut system_content = String::new();
    let mut other_messages = Vec::new();

    for msg in messages {
        if msg.role == MessageRole::System {
            if !system_content.is_empty() {
                system_content.push('\n');
            }

            if let Some(text) = msg.content_text() {
                system_content.push_str(text);
            }
        } else {
            other_messages.push(msg);
        }
    }

    let system = if system_content.is_empty() {
        None
    } else {
        Some(system_content)
    };

    (system, other_messages)
}

fn message_to_json(message: &Message) -> Value {
    let role = match message.role {
        MessageRole::Assistant => "assistant",
        _ => "user",
    };

    if !message.has_parts() {
        return json!({
            "role": role,
            "content": message.content_text().unwrap_or_default(),
        });
    }

    let blocks: Vec<Value> = message
        .content_parts()
        .into_iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::ImageBase64 { data, media_type } => json!({
                "type": "image",
                "source": { "type": "base64", "media_type": media_type, "data": data }
            }),
            ContentPart::Document {
                name,
                data,
                media_type,
            } => json!({
                "type": "document",
                "title": name,
                "source": { "type": "base64", "media_type": media_type, "data": data }
            }),
        })
        .collect();

    json!({ "role": role, "content": blocks })
}

// Anthropic API types

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
    error: Option<StreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    delta_type: String,
    text: Option<String>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::LlmJsonSchema;
    use crate::infrastructure::llm::http_client::mock::MockHttpClient;
    use bytes::Bytes;

    const TEST_URL: &str = "https://api.anthropic.com/v1/messages";

    fn text_response(text: &str) -> Value {
        json!({
            "id": "msg_123",
            "model": "claude-3-5-sonnet-20241022",
            "content": [{ "type": "text", "text": text }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 12, "output_tokens": 6 }
        })
    }

    #[tokio::test]
    async fn test_anthropic_chat() {
        let client = MockHttpClient::new().with_response(TEST_URL, text_response("Hello there"));
        let provider = AnthropicProvider::new(client, "test-key");

        let request = LlmRequest::builder()
            .system("Be brief")
            .user("Hello")
            .build();
        let response = provider
            .chat("claude-3-5-sonnet-20241022", request)
            .await
            .unwrap();

        assert_eq!(response.id, "msg_123");
        assert_eq!(response.content(), Some("Hello there"));
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));

        let body = &provider.client.bodies()[0];
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], 4096);
    }

    #[tokio::test]
    async fn test_anthropic_overloaded_status() {
        let client = MockHttpClient::new().with_status(TEST_URL, 529, "overloaded");
        let provider = AnthropicProvider::new(client, "test-key");

        let request = LlmRequest::builder().user("Hello").build();
        let err = provider
            .chat("claude-3-5-sonnet-20241022", request)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), Some(529));
    }

    #[tokio::test]
    async fn test_anthropic_schema_goes_to_system_prompt() {
        let client =
            MockHttpClient::new().with_response(TEST_URL, text_response("{\"steps\":[\"a\"]}"));
        let provider = AnthropicProvider::new(client, "test-key");

        let request = LlmRequest::builder()
            .system("You plan")
            .user("Plan this")
            .json_schema(LlmJsonSchema::new("workflow_steps", json!({"type": "object"})))
            .build();
        provider
            .chat("claude-3-5-sonnet-20241022", request)
            .await
            .unwrap();

        let body = &provider.client.bodies()[0];
        let system = body["system"].as_str().unwrap();
        assert!(system.starts_with("You plan\n\n"));
        assert!(system.contains("JSON schema"));
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_document_block() {
        let message = Message::user("Summarize").with_part(ContentPart::Document {
            name: "will.pdf".to_string(),
            data: "aGk=".to_string(),
            media_type: "application/pdf".to_string(),
        });

        let json = message_to_json(&message);
        assert_eq!(json["content"][1]["type"], "document");
        assert_eq!(json["content"][1]["source"]["media_type"], "application/pdf");
        assert_eq!(json["content"][1]["source"]["data"], "aGk=");
    }

    #[tokio::test]
    async fn test_anthropic_stream() {
        let chunks = vec![
            Bytes::from(
                "event: message_start\ndata: {\"type\":\"message_start\"}\n\n\
                 event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi \"}}\n\n",
            ),
            Bytes::from(
                "event: ping\ndata: {\"type\":\"ping\"}\n\n\
                 data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"there\"}}\n\n\
                 data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"}}\n\n\
                 data: {\"type\":\"message_stop\"}\n\n",
            ),
        ];
        let client = MockHttpClient::new().with_stream_response(TEST_URL, chunks);
        let provider = AnthropicProvider::new(client, "test-key");

        let request = LlmRequest::builder().user("Hello").build();
        let stream = provider
            .chat_stream("claude-3-5-sonnet-20241022", request)
            .await
            .unwrap();
        let chunks: Vec<StreamChunk> = stream.map(Result::unwrap).collect().await;

        let text: String = chunks.iter().filter_map(|c| c.delta.clone()).collect();
        assert_eq!(text, "Hi there");
        assert_eq!(chunks.len(), 4);
    }

    #[tokio::test]
    async fn test_anthropic_stream_error_event() {
        let chunks = vec![Bytes::from(
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
        )];
        let client = MockHttpClient::new().with_stream_response(TEST_URL, chunks);
        let provider = AnthropicProvider::new(client, "test-key");

        let request = LlmRequest::builder().user("Hello").build();
        let mut stream = provider
            .chat_stream("claude-3-5-sonnet-20241022", request)
            .await
            .unwrap();

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("overloaded_error"));
    }
}
