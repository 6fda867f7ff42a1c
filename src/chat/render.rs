//! Output rendering for the chat application.
//!
//! [`Renderer`] abstracts the terminal so the loop can be driven without one.  The
//! [`PlainTextRenderer`] writes plain text with optional ANSI styling whose accent colour follows
//! the store's theme.  [`StreamEcho`] watches the store and prints a reply as it streams in.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::store::{ConversationStore, StoreEvent, StoreObserver};
use crate::types::{Conversation, Role, Theme};

/// ANSI escape code for dim text (used for metadata).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for the current conversation).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Accent on dark terminals.
const ANSI_CYAN: &str = "\x1b[36m";

/// Accent on light terminals.
const ANSI_BLUE: &str = "\x1b[34m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
pub trait Renderer: Send {
    /// Print a chunk of assistant text as it streams.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print the conversation list, marking the current one.
    fn print_conversations(&mut self, conversations: &[&Conversation], current: Option<&str>);

    /// Print every message of a conversation.
    fn print_transcript(&mut self, conversation: &Conversation);

    /// Called when a reply is complete.
    fn finish_response(&mut self);

    /// Adopt a new theme.
    fn set_theme(&mut self, theme: Theme);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    out: Box<dyn Write + Send>,
    use_color: bool,
    theme: Theme,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }

    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: impl Write + Send + 'static, use_color: bool) -> Self {
        Self {
            out: Box::new(out),
            use_color,
            theme: Theme::default(),
        }
    }

    fn accent(&self) -> &'static str {
        match self.theme {
            Theme::Dark => ANSI_CYAN,
            Theme::Light => ANSI_BLUE,
        }
    }

    fn styled(&mut self, style: &str, text: &str) {
        let _ = if self.use_color {
            write!(self.out, "{style}{text}{ANSI_RESET}")
        } else {
            write!(self.out, "{text}")
        };
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_text(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        self.styled(ANSI_RED, &format!("Error: {error}"));
        let _ = writeln!(self.out);
        self.flush();
    }

    fn print_info(&mut self, info: &str) {
        let _ = writeln!(self.out, "{info}");
        self.flush();
    }

    fn print_conversations(&mut self, conversations: &[&Conversation], current: Option<&str>) {
        if conversations.is_empty() {
            self.print_info("No conversations.");
            return;
        }
        for (index, conversation) in conversations.iter().enumerate() {
            let is_current = current == Some(conversation.id.as_str());
            let marker = if is_current { '*' } else { ' ' };
            let line = format!("{marker} {:>2}. {}", index + 1, conversation.title);
            if is_current {
                let style = format!("{ANSI_BOLD}{}", self.accent());
                self.styled(&style, &line);
            } else {
                self.styled("", &line);
            }
            let count = conversation.messages.len();
            let plural = if count == 1 { "" } else { "s" };
            self.styled(ANSI_DIM, &format!("  ({count} message{plural})"));
            let _ = writeln!(self.out);
        }
        self.flush();
    }

    fn print_transcript(&mut self, conversation: &Conversation) {
        let accent = self.accent();
        self.styled(&format!("{ANSI_BOLD}{accent}"), &conversation.title);
        let _ = writeln!(self.out);
        for message in &conversation.messages {
            let label = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            self.styled(accent, &format!("{label}> "));
            let _ = writeln!(self.out, "{}", message.content);
        }
        self.flush();
    }

    fn finish_response(&mut self) {
        let _ = writeln!(self.out);
        self.flush();
    }

    fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }
}

/// What has been echoed of the message currently streaming.
#[derive(Default)]
struct Echoed {
    message_id: Option<String>,
    text: String,
}

/// A store observer that prints assistant replies of the current conversation as they grow.
///
/// Only the new suffix is printed on each update.  When a message is overwritten with text that
/// does not extend what was printed (a failure notice replacing a partial reply), the new text is
/// printed on its own line.
pub struct StreamEcho<R: Renderer> {
    renderer: Mutex<R>,
    echoed: Mutex<Echoed>,
}

impl<R: Renderer> StreamEcho<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            renderer: Mutex::new(renderer),
            echoed: Mutex::new(Echoed::default()),
        }
    }

    /// Run `f` against the wrapped renderer.
    pub fn with_renderer<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.renderer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn echo(&self, message_id: &str, content: &str) {
        let mut echoed = self.echoed.lock().unwrap_or_else(PoisonError::into_inner);
        if echoed.message_id.as_deref() != Some(message_id) {
            echoed.message_id = Some(message_id.to_string());
            echoed.text.clear();
        }
        if content == echoed.text {
            return;
        }
        self.with_renderer(|renderer| match content.strip_prefix(echoed.text.as_str()) {
            Some(suffix) => renderer.print_text(suffix),
            None => {
                renderer.print_text("\n");
                renderer.print_text(content);
            }
        });
        echoed.text = content.to_string();
    }
}

impl<R: Renderer> StoreObserver for StreamEcho<R> {
    fn on_event(&self, store: &ConversationStore, event: &StoreEvent) {
        let (conversation_id, message_id) = match event {
            StoreEvent::MessageAdded {
                conversation_id,
                message_id,
            }
            | StoreEvent::MessageUpdated {
                conversation_id,
                message_id,
            } => (conversation_id, message_id),
            StoreEvent::ThemeChanged { theme } => {
                self.with_renderer(|renderer| renderer.set_theme(*theme));
                return;
            }
            _ => return,
        };
        if store.current_conversation_id() != Some(conversation_id.as_str()) {
            return;
        }
        let Some(message) = store
            .conversation(conversation_id)
            .and_then(|c| c.message(message_id))
        else {
            return;
        };
        if message.role == Role::Assistant {
            self.echo(message_id, &message.content);
        }
    }
}
