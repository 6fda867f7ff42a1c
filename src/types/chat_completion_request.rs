use serde::{Deserialize, Serialize};

use crate::types::{Message, Role};

/// One turn of history as the completion endpoint expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the turn.
    pub role: Role,

    /// Text of the turn.
    pub content: String,
}

impl ChatMessage {
    /// Create a new `ChatMessage`.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self::new(message.role, message.content.clone())
    }
}

/// Body of a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier, e.g. `anthropic/claude-3.5-sonnet`.
    pub model: String,

    /// Full history, oldest first, ending with the new user turn.
    pub messages: Vec<ChatMessage>,

    /// Always true: replies are consumed as a server-sent event stream.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Create a streaming request.
    pub fn streaming(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}
