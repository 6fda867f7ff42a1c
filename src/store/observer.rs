//! Change notification for the conversation store.
//!
//! Hosts register a [`StoreObserver`] to learn about every mutation: a terminal front end echoes
//! streamed text, a GUI would schedule a redraw, and a test can record the event sequence.

use crate::store::ConversationStore;
use crate::types::Theme;

/// A change the store has just applied and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A conversation was created and made current.
    ConversationCreated {
        /// The new conversation.
        conversation_id: String,
    },

    /// A conversation was removed.
    ConversationDeleted {
        /// The removed conversation.
        conversation_id: String,
    },

    /// A conversation got a new title.
    ConversationRenamed {
        /// The renamed conversation.
        conversation_id: String,
        /// The new title.
        title: String,
    },

    /// The current conversation pointer moved.
    CurrentChanged {
        /// The new current conversation, if any.
        conversation_id: Option<String>,
    },

    /// A message was appended.
    MessageAdded {
        /// Conversation that received the message.
        conversation_id: String,
        /// The new message.
        message_id: String,
    },

    /// A message's content was replaced.
    MessageUpdated {
        /// Conversation holding the message.
        conversation_id: String,
        /// The updated message.
        message_id: String,
    },

    /// Every message of a conversation was removed.
    MessagesCleared {
        /// The cleared conversation.
        conversation_id: String,
    },

    /// The sidebar flag flipped.
    SidebarToggled {
        /// Whether the sidebar is now collapsed.
        collapsed: bool,
    },

    /// The theme flipped.  Hosts should restyle to match.
    ThemeChanged {
        /// The theme now in effect.
        theme: Theme,
    },

    /// The conversation set was replaced by an import.
    Imported {
        /// Number of conversations imported.
        count: usize,
    },

    /// An import was refused and the store left untouched.
    ImportRejected {
        /// Why the payload was refused.
        reason: String,
    },
}

/// A trait for observing store mutations.
///
/// Observers run synchronously after the mutation has been persisted, while the store is still
/// borrowed.  They may read the store they are handed but must not try to lock the
/// [`SharedStore`](crate::store::SharedStore) that owns it.
///
/// # Example
///
/// ```rust,ignore
/// use confab::store::{ConversationStore, StoreEvent, StoreObserver};
///
/// struct Titles;
///
/// impl StoreObserver for Titles {
///     fn on_event(&self, _: &ConversationStore, event: &StoreEvent) {
///         if let StoreEvent::ConversationRenamed { title, .. } = event {
///             println!("renamed to {title}");
///         }
///     }
/// }
/// ```
pub trait StoreObserver: Send + Sync {
    /// Called once per applied mutation.
    fn on_event(&self, store: &ConversationStore, event: &StoreEvent);
}
