// Public modules
pub mod chat;
pub mod client;
pub mod controller;
pub mod error;
pub mod observability;
pub mod sse;
pub mod store;
pub mod types;
pub mod utils;

// Re-exports
pub use client::{CompletionBackend, Completions, TokenStream};
pub use controller::{
    FAILURE_NOTICE, MISSING_CREDENTIAL_NOTICE, ReplyOutcome, StreamPhase, StreamingController,
    StreamingState,
};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use sse::{SseLine, extract_token, process_sse};
pub use store::{
    ConversationStore, FileSlot, MemorySlot, SharedStore, StateSlot, StoreEvent, StoreObserver,
};
pub use types::*;
