use serde::{Deserialize, Serialize};

use crate::types::{Conversation, Theme};

/// Version string written into export files.
pub const EXPORT_VERSION: &str = "1.0";

/// Version number of the persisted record layout.
pub const PERSISTED_VERSION: u32 = 0;

/// The import/export file format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Every conversation, in store order.
    pub chats: Vec<Conversation>,

    /// Always [`EXPORT_VERSION`] on export; not checked on import.
    pub version: String,
}

impl ExportDocument {
    /// Create a document for `chats` at the current export version.
    pub fn new(chats: Vec<Conversation>) -> Self {
        Self {
            chats,
            version: EXPORT_VERSION.to_string(),
        }
    }
}

/// Everything the store keeps between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    /// Conversations, newest-created first.
    #[serde(default)]
    pub chats: Vec<Conversation>,

    /// The selected conversation, if any.
    #[serde(default)]
    pub current_chat_id: Option<String>,

    /// Whether the conversation list is hidden.
    #[serde(default)]
    pub sidebar_collapsed: bool,

    /// Theme the host should apply.
    #[serde(default)]
    pub theme: Theme,
}

/// The durable record: the state plus layout version metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// The store state.
    pub state: StoreState,

    /// Layout version, [`PERSISTED_VERSION`] when written by this crate.
    #[serde(default)]
    pub version: u32,
}

impl PersistedState {
    /// Wrap `state` at the current layout version.
    pub fn new(state: StoreState) -> Self {
        Self {
            state,
            version: PERSISTED_VERSION,
        }
    }
}
