//! Core chat session management.
//!
//! [`ChatSession`] connects the line editor to the store and the streaming controller: it
//! executes slash commands against the store and sends everything else as a prompt.

use std::sync::Arc;

use utf8path::Path;

use crate::chat::commands::{ChatCommand, ConversationRef, help_text, parse_command};
use crate::chat::config::ChatConfig;
use crate::chat::render::{Renderer, StreamEcho};
use crate::client::{CompletionBackend, Completions};
use crate::controller::{ReplyOutcome, StreamingController};
use crate::error::{Error, Result};
use crate::store::{ConversationStore, FileSlot, SharedStore};
use crate::types::Conversation;

/// What the input loop should do next.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// An interactive session over one store.
pub struct ChatSession<B: CompletionBackend, R: Renderer + 'static> {
    controller: StreamingController<B>,
    config: ChatConfig,
    echo: Arc<StreamEcho<R>>,
}

impl<R: Renderer + 'static> ChatSession<Completions, R> {
    /// Open the persisted store under the configured data directory and connect to the
    /// configured endpoint.
    pub fn open(config: ChatConfig, renderer: R) -> Result<Self> {
        let dir = Path::try_from(config.data_dir.clone()).map_err(|err| {
            Error::validation(
                format!("data directory is not valid UTF-8: {err}"),
                Some("data_dir".to_string()),
            )
        })?;
        let store = ConversationStore::open(FileSlot::new(dir.into_owned()));
        let client = config.client()?;
        let controller = StreamingController::new(SharedStore::new(store), client);
        Ok(Self::new(controller, config, renderer))
    }
}

impl<B: CompletionBackend, R: Renderer + 'static> ChatSession<B, R> {
    /// Wrap a controller.  The renderer is subscribed to the controller's store.
    pub fn new(controller: StreamingController<B>, config: ChatConfig, renderer: R) -> Self {
        let echo = Arc::new(StreamEcho::new(renderer));
        let theme = controller.store().write(|store| {
            store.subscribe(echo.clone());
            store.theme()
        });
        echo.with_renderer(|r| r.set_theme(theme));
        Self {
            controller,
            config,
            echo,
        }
    }

    pub fn store(&self) -> &SharedStore {
        self.controller.store()
    }

    pub fn controller(&self) -> &StreamingController<B> {
        &self.controller
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Run `f` against the session's renderer.
    pub fn with_renderer<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        self.echo.with_renderer(f)
    }

    /// Handle one line of input.
    pub async fn handle_line(&self, line: &str) -> Flow {
        let line = line.trim();
        if line.is_empty() {
            return Flow::Continue;
        }
        match parse_command(line) {
            Some(command) => self.handle_command(command),
            None => {
                self.send(line).await;
                Flow::Continue
            }
        }
    }

    /// Send a prompt and report how the reply ended.
    ///
    /// The reply itself reaches the terminal through the store as it streams.
    pub async fn send(&self, prompt: &str) -> ReplyOutcome {
        let outcome = self.controller.send(prompt).await;
        match &outcome {
            ReplyOutcome::Completed { .. } | ReplyOutcome::MissingCredential => {
                self.with_renderer(|r| r.finish_response());
            }
            ReplyOutcome::Failed(err) => self.with_renderer(|r| {
                r.finish_response();
                r.print_error(&err.to_string());
            }),
            ReplyOutcome::Busy => {
                self.with_renderer(|r| r.print_info("A reply is still streaming."));
            }
            ReplyOutcome::EmptyPrompt => {}
        }
        outcome
    }

    /// Execute a slash command.
    pub fn handle_command(&self, command: ChatCommand) -> Flow {
        match command {
            ChatCommand::New => {
                self.store().write(|store| store.create_conversation());
                self.info("Started a new conversation.");
                self.show_sidebar();
            }
            ChatCommand::List(query) => self.store().read(|store| {
                let conversations: Vec<&Conversation> = match query.as_deref() {
                    Some(query) => store.search(query),
                    None => store.conversations().iter().collect(),
                };
                let current = store.current_conversation_id();
                self.with_renderer(|r| r.print_conversations(&conversations, current));
            }),
            ChatCommand::Switch(target) => {
                let switched = self.store().write(|store| {
                    let id = resolve(store, &target)?;
                    store.set_current(Some(&id));
                    Some(id)
                });
                match switched {
                    Some(_) => {
                        self.store().read(|store| {
                            if let Some(conversation) = store.current_conversation() {
                                self.with_renderer(|r| r.print_transcript(conversation));
                            }
                        });
                        self.show_sidebar();
                    }
                    None => self.error("No such conversation."),
                }
            }
            ChatCommand::Rename(title) => {
                let renamed = self.store().write(|store| {
                    let id = store.current_conversation_id()?.to_string();
                    store.rename_conversation(&id, &title);
                    store.conversation(&id).map(|c| c.title.clone())
                });
                match renamed {
                    Some(title) => self.info(&format!("Renamed to: {title}")),
                    None => self.error("No current conversation."),
                }
            }
            ChatCommand::Delete(target) => {
                let deleted = self.store().write(|store| {
                    let id = match &target {
                        Some(target) => resolve(store, target)?,
                        None => store.current_conversation_id()?.to_string(),
                    };
                    let title = store.conversation(&id).map(|c| c.title.clone());
                    store.delete_conversation(&id);
                    title
                });
                match deleted {
                    Some(title) => self.info(&format!("Deleted: {title}")),
                    None => self.error("No such conversation."),
                }
            }
            ChatCommand::Clear => {
                let cleared = self.store().write(|store| {
                    let id = store.current_conversation_id()?.to_string();
                    store.clear_messages(&id);
                    Some(())
                });
                match cleared {
                    Some(()) => self.info("Conversation cleared."),
                    None => self.error("No current conversation."),
                }
            }
            ChatCommand::Export(dir) => {
                let dir = dir.unwrap_or_else(|| ".".to_string());
                match self.store().read(|store| store.export_to_dir(&dir)) {
                    Ok(path) => self.info(&format!("Exported to {}", path.display())),
                    Err(err) => self.error(&err.to_string()),
                }
            }
            ChatCommand::Import(path) => {
                match self.store().write(|store| store.import_from_file(&path)) {
                    Ok(count) => self.info(&format!("Imported {count} conversations.")),
                    Err(err) => self.error(&err.to_string()),
                }
            }
            ChatCommand::Sidebar => {
                let collapsed = self.store().write(|store| store.toggle_sidebar());
                if collapsed {
                    self.info("Conversation list hidden.");
                } else {
                    self.info("Conversation list shown.");
                    self.show_sidebar();
                }
            }
            ChatCommand::Theme => {
                let theme = self.store().write(|store| store.toggle_theme());
                self.info(&format!("Theme: {theme}"));
            }
            ChatCommand::ShowConfig => {
                let config = &self.config;
                let credential = if self.controller.backend().credential_configured() {
                    "configured"
                } else {
                    "missing"
                };
                let lines = [
                    format!("Model: {}", config.model),
                    format!("Endpoint: {}", config.endpoint),
                    format!("Referer: {}", config.referer),
                    format!("Data directory: {}", config.data_dir.display()),
                    format!("API key: {credential}"),
                    format!("Color: {}", if config.use_color { "on" } else { "off" }),
                ];
                for line in lines {
                    self.info(&line);
                }
            }
            ChatCommand::Help => {
                for line in help_text().lines() {
                    self.info(&format!("    {line}"));
                }
            }
            ChatCommand::Quit => return Flow::Quit,
            ChatCommand::Invalid(message) => self.error(&message),
        }
        Flow::Continue
    }

    /// Print the conversation list unless the sidebar is collapsed.
    fn show_sidebar(&self) {
        self.store().read(|store| {
            if store.sidebar_collapsed() {
                return;
            }
            let conversations: Vec<&Conversation> = store.conversations().iter().collect();
            let current = store.current_conversation_id();
            self.with_renderer(|r| r.print_conversations(&conversations, current));
        });
    }

    fn info(&self, message: &str) {
        self.with_renderer(|r| r.print_info(message));
    }

    fn error(&self, message: &str) {
        self.with_renderer(|r| r.print_error(message));
    }
}

/// Find the id a command refers to.
fn resolve(store: &ConversationStore, target: &ConversationRef) -> Option<String> {
    match target {
        ConversationRef::Index(n) => store
            .conversations()
            .get(n.checked_sub(1)?)
            .map(|c| c.id.clone()),
        ConversationRef::Id(id) => store.conversation(id).map(|c| c.id.clone()),
    }
}
