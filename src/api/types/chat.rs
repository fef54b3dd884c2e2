//! Chat request types

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::domain::llm::{Message, MessageRole};
use crate::domain::retrieval::ResourceId;
use crate::domain::workflow::{Attachment, ChatTurn};
use crate::infrastructure::services::ChatMode;

/// A chat message as sent by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl From<ChatMessage> for Message {
    fn from(message: ChatMessage) -> Self {
        Message::text(message.role, message.content)
    }
}

/// An uploaded file. `content` is base64, optionally as a data URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePayload>,
}

/// POST /v1/chat body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub mode: ChatMode,
    #[serde(default)]
    pub has_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RequestData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ChatRequest {
    /// Validate the request and convert it into a chat turn
    pub fn into_turn(self) -> Result<(ChatMode, ChatTurn), ApiError> {
        match self.messages.last() {
            None => {
                return Err(ApiError::bad_request("Messages cannot be empty").with_param("messages"));
            }
            Some(last) if last.role != MessageRole::User => {
                return Err(
                    ApiError::bad_request("The last message must be from the user")
                        .with_param("messages"),
                );
            }
            Some(_) => {}
        }

        let file = self.data.and_then(|data| data.file);
        let attachment = match (self.has_file, file) {
            (true, None) => {
                return Err(
                    ApiError::bad_request("hasFile is set but no file was provided")
                        .with_param("data.file"),
                );
            }
            (true, Some(file)) => Some(decode_attachment(file)?),
            (false, _) => None,
        };

        let resource_id = self
            .resource_id
            .map(ResourceId::new)
            .transpose()
            .map_err(|e| ApiError::from(e).with_param("resourceId"))?;

        let mut turn = ChatTurn::new(self.messages.into_iter().map(Message::from).collect());
        if let Some(attachment) = attachment {
            turn = turn.with_attachment(attachment);
        }
        if let Some(resource_id) = resource_id {
            turn = turn.with_resource(resource_id);
        }

        Ok((self.mode, turn))
    }
}

fn decode_attachment(file: FilePayload) -> Result<Attachment, ApiError> {
    let (url_media_type, data) = split_data_url(&file.content);

    if data.is_empty() || STANDARD.decode(data).is_err() {
        return Err(
            ApiError::bad_request("File content must be valid base64")
                .with_param("data.file.content"),
        );
    }

    let media_type = file
        .media_type
        .filter(|t| !t.trim().is_empty())
        .or(url_media_type)
        .unwrap_or_else(|| {
            mime_guess::from_path(&file.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

    Ok(Attachment::new(file.name, media_type, data))
}

/// Strip a `data:<mime>;base64,` prefix, returning the mime type it named
fn split_data_url(content: &str) -> (Option<String>, &str) {
    let Some(rest) = content.strip_prefix("data:") else {
        return (None, content.trim());
    };

    match rest.split_once(',') {
        Some((header, data)) => {
            let media_type = header
                .trim_end_matches(";base64")
                .split(';')
                .next()
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            (media_type, data.trim())
        }
        None => (None, content.trim()),
    }
}

/// POST /v1/resources body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResourceRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceResponse {
    pub resource_id: String,
}
