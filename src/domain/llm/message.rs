use serde::{Deserialize, Serialize};

/// Role of a message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// Content part for multimodal messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageBase64 { data: String, media_type: String },
    Document {
        name: String,
        data: String,
        media_type: String,
    },
}

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    #[serde(flatten)]
    content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text { content: String },
    Parts { content: Vec<ContentPart> },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text {
                content: content.into(),
            },
        }
    }

    pub fn user_with_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts { content: parts },
        }
    }

    /// Returns a copy of this message with an extra content part appended.
    ///
    /// Plain text content is converted to a leading text part.
    pub fn with_part(self, part: ContentPart) -> Self {
        let mut parts = match self.content {
            MessageContent::Text { content } => vec![ContentPart::Text { text: content }],
            MessageContent::Parts { content } => content,
        };
        parts.push(part);

        Self {
            role: self.role,
            content: MessageContent::Parts { content: parts },
        }
    }

    pub fn content_text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { content } => Some(content),
            MessageContent::Parts { content } => content.iter().find_map(|p| {
                if let ContentPart::Text { text } = p {
                    Some(text.as_str())
                } else {
                    None
                }
            }),
        }
    }

    pub fn content_parts(&self) -> Vec<&ContentPart> {
        match &self.content {
            MessageContent::Text { .. } => vec![],
            MessageContent::Parts { content } => content.iter().collect(),
        }
    }

    pub fn has_parts(&self) -> bool {
        matches!(self.content, MessageContent::Parts { .. })
    }
}
