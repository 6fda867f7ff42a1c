//! Drives one assistant reply from prompt to finished message.
//!
//! The controller owns the only streaming state in the system.  A reply is written into the
//! store as it arrives: an empty assistant placeholder is appended first and then overwritten
//! with the growing accumulator after every token, so any observer of the store sees the reply
//! build up.  Failures never escape as errors; they become a fixed notice in the placeholder plus
//! a [`ReplyOutcome`] describing what happened.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::StreamExt;

use crate::client::CompletionBackend;
use crate::error::Error;
use crate::observability::{
    REPLIES_COMPLETED, REPLIES_FAILED, REPLIES_MISSING_CREDENTIAL, STREAM_DURATION,
    STREAM_TOKENS, STREAM_TTFT,
};
use crate::store::SharedStore;
use crate::types::{ChatMessage, Role};

/// Assistant message written when no API key is configured.
pub const MISSING_CREDENTIAL_NOTICE: &str = "⚠️ OpenRouter API key not configured. Please set CONFAB_API_KEY (or OPENROUTER_API_KEY) in your environment.";

/// Replaces the placeholder when a reply could not be obtained.
pub const FAILURE_NOTICE: &str =
    "❌ Failed to get response. Please check your API key and try again.";

/// Where the in-flight reply is.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum StreamPhase {
    /// No reply in flight.
    #[default]
    Idle,
    /// The request is on the wire; no token has arrived yet.
    Sending,
    /// Tokens are arriving.
    Receiving,
}

/// A snapshot of the controller's streaming state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamingState {
    /// True from the moment a request is issued until the reply finishes or fails.
    pub is_streaming: bool,
    /// The placeholder message being filled in.
    pub message_id: Option<String>,
    /// How far the in-flight reply has got.
    pub phase: StreamPhase,
}

/// How a reply attempt ended.
#[derive(Debug)]
pub enum ReplyOutcome {
    /// The stream ran to the end; `content` is what the placeholder now holds.
    Completed { content: String },
    /// No key was configured and the notice was written instead.
    MissingCredential,
    /// The request failed; the placeholder holds [`FAILURE_NOTICE`].
    Failed(Error),
    /// The prompt was empty after trimming.
    EmptyPrompt,
    /// Another reply is still streaming.
    Busy,
}

impl ReplyOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, ReplyOutcome::Completed { .. })
    }

    /// The failure, if the reply failed.
    pub fn error(&self) -> Option<&Error> {
        match self {
            ReplyOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Resets the streaming state when dropped.
///
/// Held for the whole reply so the state clears on success, on failure, on panic, and when the
/// reply future is dropped mid-stream.
struct StreamingGuard {
    state: Arc<Mutex<StreamingState>>,
}

impl StreamingGuard {
    fn enter(state: &Arc<Mutex<StreamingState>>) -> Self {
        let guard = Self {
            state: Arc::clone(state),
        };
        guard.update(|s| {
            s.is_streaming = true;
            s.message_id = None;
            s.phase = StreamPhase::Sending;
        });
        guard
    }

    fn update(&self, f: impl FnOnce(&mut StreamingState)) {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Drop for StreamingGuard {
    fn drop(&mut self) {
        self.update(|s| *s = StreamingState::default());
    }
}

/// Obtains assistant replies from a [`CompletionBackend`] and writes them into a store.
pub struct StreamingController<B: CompletionBackend> {
    store: SharedStore,
    backend: B,
    state: Arc<Mutex<StreamingState>>,
}

impl<B: CompletionBackend> StreamingController<B> {
    pub fn new(store: SharedStore, backend: B) -> Self {
        Self {
            store,
            backend,
            state: Arc::new(Mutex::new(StreamingState::default())),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn streaming_state(&self) -> StreamingState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming_state().is_streaming
    }

    /// Send a prompt from the composer.
    ///
    /// The prompt is trimmed and ignored when empty.  While a reply is streaming nothing is
    /// sent.  Otherwise the prompt is appended to the current conversation (creating one when
    /// none is selected) and a reply is streamed into it.
    pub async fn send(&self, prompt: &str) -> ReplyOutcome {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return ReplyOutcome::EmptyPrompt;
        }
        if self.is_streaming() {
            return ReplyOutcome::Busy;
        }
        let conversation_id = self.store.write(|store| {
            let id = match store.current_conversation_id() {
                Some(id) => id.to_string(),
                None => store.create_conversation(),
            };
            store.add_message(&id, Role::User, prompt);
            id
        });
        self.stream_reply(prompt, &conversation_id).await
    }

    /// Stream an assistant reply to `prompt` into `conversation_id`.
    ///
    /// Callers must not start a second reply while one is streaming; [`send`](Self::send)
    /// enforces that.
    pub async fn stream_reply(&self, prompt: &str, conversation_id: &str) -> ReplyOutcome {
        if !self.backend.credential_configured() {
            REPLIES_MISSING_CREDENTIAL.click();
            self.store.write(|store| {
                store.add_message(conversation_id, Role::Assistant, MISSING_CREDENTIAL_NOTICE)
            });
            return ReplyOutcome::MissingCredential;
        }

        let Some(history) = self.store.read(|store| {
            store
                .conversation(conversation_id)
                .map(|c| c.messages.iter().map(ChatMessage::from).collect::<Vec<_>>())
        }) else {
            REPLIES_FAILED.click();
            return ReplyOutcome::Failed(Error::not_found(
                format!("no conversation {conversation_id}"),
                Some("conversation".to_string()),
                Some(conversation_id.to_string()),
            ));
        };

        let guard = StreamingGuard::enter(&self.state);
        let Some(message_id) = self
            .store
            .write(|store| store.add_message(conversation_id, Role::Assistant, ""))
        else {
            // Deleted between the snapshot and the placeholder.
            REPLIES_FAILED.click();
            return ReplyOutcome::Failed(Error::not_found(
                format!("no conversation {conversation_id}"),
                Some("conversation".to_string()),
                Some(conversation_id.to_string()),
            ));
        };
        guard.update(|s| s.message_id = Some(message_id.clone()));

        let messages = request_messages(history, prompt);
        let outcome = match self.receive(&guard, messages, conversation_id, &message_id).await {
            Ok(content) => {
                REPLIES_COMPLETED.click();
                ReplyOutcome::Completed { content }
            }
            Err(err) => {
                REPLIES_FAILED.click();
                log::warn!("streaming reply failed: {err}");
                self.store.write(|store| {
                    store.update_message_content(conversation_id, &message_id, FAILURE_NOTICE)
                });
                ReplyOutcome::Failed(err)
            }
        };
        // Token updates are debounced by the store; the finished reply is saved now.
        self.store.write(|store| store.flush());
        outcome
    }

    async fn receive(
        &self,
        guard: &StreamingGuard,
        messages: Vec<ChatMessage>,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<String, Error> {
        let start = Instant::now();
        let mut tokens = self.backend.stream_completion(messages).await?;
        guard.update(|s| s.phase = StreamPhase::Receiving);

        let mut accumulated = String::new();
        while let Some(token) = tokens.next().await {
            let token = token?;
            if token.is_empty() {
                continue;
            }
            if accumulated.is_empty() {
                STREAM_TTFT.add(start.elapsed().as_secs_f64());
            }
            STREAM_TOKENS.click();
            accumulated.push_str(&token);
            self.store.write(|store| {
                store.update_message_content(conversation_id, message_id, accumulated.as_str())
            });
        }
        STREAM_DURATION.add(start.elapsed().as_secs_f64());
        Ok(accumulated)
    }
}

/// Build the request history: prior turns, then the prompt as the newest user turn.
///
/// When the history already ends with the prompt as a user turn (the composer appends it before
/// asking for a reply), it is not repeated.
fn request_messages(mut history: Vec<ChatMessage>, prompt: &str) -> Vec<ChatMessage> {
    let already_sent = history
        .last()
        .is_some_and(|last| last.role == Role::User && last.content == prompt);
    if !already_sent {
        history.push(ChatMessage::user(prompt));
    }
    history
}
