//! Inbound chat turn handed to the workflow engine

use crate::domain::llm::{ContentPart, Message, MessageRole};
use crate::domain::retrieval::ResourceId;

/// A file attached to the latest user message, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub data: String,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn content_part(&self) -> ContentPart {
        if self.is_image() {
            ContentPart::ImageBase64 {
                data: self.data.clone(),
                media_type: self.media_type.clone(),
            }
        } else {
            ContentPart::Document {
                name: self.name.clone(),
                data: self.data.clone(),
                media_type: self.media_type.clone(),
            }
        }
    }
}

/// Conversation history plus the optional attachment and resource for one request
#[derive(Debug, Clone, Default)]
pub struct ChatTurn {
    pub messages: Vec<Message>,
    pub attachment: Option<Attachment>,
    pub resource_id: Option<ResourceId>,
}

impl ChatTurn {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            attachment: None,
            resource_id: None,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_resource(mut self, resource_id: ResourceId) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn has_attachment(&self) -> bool {
        self.attachment.is_some()
    }

    /// Text of the most recent user message
    pub fn latest_user_input(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .and_then(Message::content_text)
    }

    /// History with the attachment placed on the most recent user message
    pub fn messages_with_attachment(&self) -> Vec<Message> {
        let mut messages = self.messages.clone();

        let Some(attachment) = &self.attachment else {
            return messages;
        };

        if let Some(last_user) = messages
            .iter_mut()
            .rev()
            .find(|m| m.role == MessageRole::User)
        {
            let message = std::mem::replace(last_user, Message::user(""));
            *last_user = message.with_part(attachment.content_part());
        }

        messages
    }
}
