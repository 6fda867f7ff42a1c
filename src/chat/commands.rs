//! Slash command parsing for the chat application.
//!
//! Input starting with `/` controls the conversation list and display instead of being sent as
//! a prompt.

/// Names a conversation on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationRef {
    /// 1-based position in the conversation list.
    Index(usize),
    /// A conversation id.
    Id(String),
}

impl ConversationRef {
    fn parse(arg: &str) -> Option<Self> {
        if arg.chars().all(|c| c.is_ascii_digit()) {
            match arg.parse::<usize>() {
                Ok(0) | Err(_) => None,
                Ok(n) => Some(ConversationRef::Index(n)),
            }
        } else {
            Some(ConversationRef::Id(arg.to_string()))
        }
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Start a new conversation.
    New,

    /// List conversations, optionally filtered by title.
    List(Option<String>),

    /// Make another conversation current.
    Switch(ConversationRef),

    /// Rename the current conversation.
    Rename(String),

    /// Delete a conversation; `None` means the current one.
    Delete(Option<ConversationRef>),

    /// Clear the current conversation's messages.
    Clear,

    /// Export all conversations into a directory (default: the working directory).
    Export(Option<String>),

    /// Replace all conversations with those in an export file.
    Import(String),

    /// Show or hide the conversation list.
    Sidebar,

    /// Switch between light and dark.
    Theme,

    /// Show the current configuration.
    ShowConfig,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be sent as a
/// prompt.
///
/// # Examples
///
/// ```
/// # use confab::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/rename Trip plans").is_some());
/// assert!(parse_command("Hello there!").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" => ChatCommand::New,
        "list" | "ls" => ChatCommand::List(argument.map(str::to_string)),
        "switch" => match argument.map(ConversationRef::parse) {
            Some(Some(target)) => ChatCommand::Switch(target),
            Some(None) => ChatCommand::Invalid("/switch expects a number from /list".to_string()),
            None => ChatCommand::Invalid("/switch requires a conversation".to_string()),
        },
        "rename" => match argument {
            Some(title) => ChatCommand::Rename(title.to_string()),
            None => ChatCommand::Invalid("/rename requires a title".to_string()),
        },
        "delete" | "rm" => match argument.map(ConversationRef::parse) {
            Some(Some(target)) => ChatCommand::Delete(Some(target)),
            Some(None) => ChatCommand::Invalid("/delete expects a number from /list".to_string()),
            None => ChatCommand::Delete(None),
        },
        "clear" => ChatCommand::Clear,
        "export" => ChatCommand::Export(argument.map(str::to_string)),
        "import" => match argument {
            Some(path) => ChatCommand::Import(path.to_string()),
            None => ChatCommand::Invalid("/import requires a file path".to_string()),
        },
        "sidebar" => ChatCommand::Sidebar,
        "theme" => ChatCommand::Theme,
        "config" => ChatCommand::ShowConfig,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new                   Start a new conversation
  /list [query]          List conversations (filter titles by query)
  /switch <n|id>         Switch to a conversation
  /rename <title>        Rename the current conversation
  /delete [n|id]         Delete a conversation (default: current)
  /clear                 Clear the current conversation's messages
  /export [dir]          Export all conversations to a JSON file
  /import <file>         Replace all conversations with an export file
  /sidebar               Show or hide the conversation list
  /theme                 Toggle light and dark theme
  /config                Show current configuration
  /help                  Show this help message
  /quit                  Exit the chat
Anything else is sent as a message."#
}
