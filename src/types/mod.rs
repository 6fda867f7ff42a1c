// Public modules
pub mod chat_completion_chunk;
pub mod chat_completion_request;
pub mod conversation;
pub mod export_document;
pub mod message;
pub mod theme;

// Re-exports
pub use chat_completion_chunk::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
pub use chat_completion_request::{ChatCompletionRequest, ChatMessage};
pub use conversation::{Conversation, DEFAULT_TITLE, TITLE_MAX_CHARS, derive_title};
pub use export_document::{
    EXPORT_VERSION, ExportDocument, PERSISTED_VERSION, PersistedState, StoreState,
};
pub use message::{Message, Role};
pub use theme::Theme;
