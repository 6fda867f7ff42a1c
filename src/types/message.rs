use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A turn typed by the person at the keyboard.
    User,

    /// A turn produced by the completion endpoint.
    Assistant,
}

impl Role {
    /// The wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn in a conversation.
///
/// Only `content` changes after creation, and only while an assistant reply is streaming in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque, unique identifier.
    pub id: String,

    /// Author of the turn.
    pub role: Role,

    /// Text of the turn.
    pub content: String,

    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Message {
    /// Create a message stamped with `timestamp` and a fresh identifier.
    pub fn new(role: Role, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: format!("msg-{timestamp}-{}", Uuid::new_v4().simple()),
            role,
            content: content.into(),
            timestamp,
        }
    }
}
