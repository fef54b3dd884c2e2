use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};

use super::http_client::{sse_data_lines, HttpClientTrait};
use crate::domain::llm::{ContentPart, LlmResponseFormat};
use crate::domain::{
    DomainError, FinishReason, LlmProvider, LlmRequest, LlmResponse, LlmStream, Message,
    MessageRole, StreamChunk, Usage,
};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// OpenAI API provider
#[derive(Debug)]
pub struct OpenAiProvider<C: HttpClientTrait> {
    client: C,
    auth_header: String,
    base_url: String,
}

impl<C: HttpClientTrait> OpenAiProvider<C> {
    pub fn new(client: C, api_key: impl Into<String>) -> Self {
        Self::with_base_url(client, api_key, DEFAULT_OPENAI_BASE_URL)
    }

    pub fn with_base_url(
        client: C,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let auth_header = format!("Bearer {}", api_key.into());
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            client,
            auth_header,
            base_url,
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_request(&self, model: &str, request: &LlmRequest) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(message_to_json).collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": request.stream,
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(ref response_format) = request.response_format {
            body["response_format"] = match response_format {
                LlmResponseFormat::Text => json!({"type": "text"}),
                LlmResponseFormat::JsonObject => json!({"type": "json_object"}),
                LlmResponseFormat::JsonSchema { json_schema } => json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": json_schema.name,
                        "strict": json_schema.strict,
                        "schema": json_schema.schema
                    }
                }),
            };
        }

        body
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    fn parse_response(&self, json: Value) -> Result<LlmResponse, DomainError> {
        let response: OpenAiResponse = serde_json::from_value(json).map_err(|e| {
            DomainError::provider("openai", format!("Failed to parse response: {}", e))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::provider("openai", "No choices in response"))?;

        let message = Message::assistant(choice.message.content.unwrap_or_default());

        let mut llm_response = LlmResponse::new(response.id, response.model, message);

        if let Some(reason) = choice.finish_reason {
            llm_response = llm_response.with_finish_reason(parse_finish_reason(&reason));
        }

        if let Some(usage) = response.usage {
            llm_response =
                llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
        }

        Ok(llm_response)
    }
}

#[async_trait]
impl<C: HttpClientTrait> LlmProvider for OpenAiProvider<C> {
    async fn chat(&self, model: &str, request: LlmRequest) -> Result<LlmResponse, DomainError> {
        let mut req = request;
        req.stream = false;

        let url = self.chat_completions_url();
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

        let url = self.chat_completions_url();
        let body = self.build_request(model, &req);
        let byte_stream = self
            .client
            .post_json_stream(&url, self.headers(), &body)
            .await?;

        let model = model.to_string();
        let stream = sse_data_lines(byte_stream).map(move |line| {
            line.and_then(|data| parse_stream_data(&data, &model))
        });

        Ok(Box::pin(stream))
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

fn parse_stream_data(data: &str, model: &str) -> Result<StreamChunk, DomainError> {
    if data.trim() == "[DONE]" {
        return Ok(StreamChunk::new(String::new(), model.to_string())
            .with_finish_reason(FinishReason::Stop));
    }

    if let Ok(error) = serde_json::from_str::<OpenAiStreamError>(data) {
        return Err(DomainError::provider("openai", error.error.message));
    }

    let chunk: OpenAiStreamChunk = serde_json::from_str(data).map_err(|e| {
        DomainError::provider("openai", format!("Failed to parse stream chunk: {}", e))
    })?;

    let mut stream_chunk = StreamChunk::new(chunk.id, chunk.model.unwrap_or_else(|| model.to_string()));

    if let Some(choice) = chunk.choices.into_iter().next() {
        if let Some(delta) = choice.delta.content {
            stream_chunk = stream_chunk.with_delta(delta);
        }

        if let Some(reason) = choice.finish_reason {
            stream_chunk = stream_chunk.with_finish_reason(parse_finish_reason(&reason));
        }
    }

    Ok(stream_chunk)
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "content_filter" => FinishReason::ContentFilter,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        _ => FinishReason::Stop,
    }
}

fn message_to_json(message: &Message) -> Value {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };

    if !message.has_parts() {
        return json!({
            "role": role,
            "content": message.content_text().unwrap_or_default(),
        });
    }

    let parts: Vec<Value> = message
        .content_parts()
        .into_iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::ImageBase64 { data, media_type } => json!({
                "type": "image_url",
                "image_url": { "url": format!("data:{};base64,{}", media_type, data) }
            }),
            ContentPart::Document {
                name,
                data,
                media_type,
            } => json!({
                "type": "file",
                "file": {
                    "filename": name,
                    "file_data": format!("data:{};base64,{}", media_type, data)
                }
            }),
        })
        .collect();

    json!({ "role": role, "content": parts })
}

// OpenAI API types

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    id: String,
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    id: String,
    model: Option<String>,
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}
