use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Message, Role};

/// Title given to conversations that have no user turn yet.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Number of characters of the first user turn kept in a derived title.
pub const TITLE_MAX_CHARS: usize = 50;

/// A titled, ordered sequence of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Opaque, unique identifier.
    pub id: String,

    /// Derived from the first user turn unless renamed.
    pub title: String,

    /// Chronological, append-only except for a full clear.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,

    /// Last mutation time in milliseconds since the Unix epoch.  Never decreases.
    #[serde(default)]
    pub updated_at: i64,
}

impl Conversation {
    /// Create an empty conversation stamped with `now`.
    pub fn new(now: i64) -> Self {
        Self {
            id: format!("chat-{now}-{}", Uuid::new_v4().simple()),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up a message by id.
    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// The most recent message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Record a mutation at `now` without letting `updated_at` move backwards.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = self.updated_at.max(now);
    }

    /// Append a message.
    ///
    /// A first turn typed by the user names the conversation, unless it was renamed while empty.
    pub fn push(&mut self, message: Message) {
        if self.messages.is_empty() && message.role == Role::User && self.title == DEFAULT_TITLE {
            self.title = derive_title(&message.content);
        }
        let timestamp = message.timestamp;
        self.messages.push(message);
        self.touch(timestamp);
    }
}

/// Title for a conversation whose first user turn is `content`.
///
/// Keeps the first fifty characters and appends `...` only when something was cut.
pub fn derive_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        head + "..."
    } else {
        head
    }
}
