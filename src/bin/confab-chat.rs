//! Interactive multi-conversation chat over an OpenAI-compatible endpoint.
//!
//! Conversations persist under the data directory and survive restarts.  Replies stream into
//! the terminal as they arrive.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage; the key comes from CONFAB_API_KEY or OPENROUTER_API_KEY
//! confab-chat
//!
//! # Specify a model and a different endpoint
//! confab-chat --model openai/gpt-4o --endpoint http://localhost:8080/v1/chat/completions
//!
//! # Keep conversations somewhere else and disable colors
//! confab-chat --data-dir /tmp/confab --no-color
//! ```
//!
//! Set `RUST_LOG=confab=debug` to see skipped stream fragments and persistence diagnostics.
//! Type `/help` while chatting for the list of commands.

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use confab::chat::{ChatArgs, ChatConfig, ChatSession, Flow, PlainTextRenderer, Renderer};
use confab::{CompletionBackend, MISSING_CREDENTIAL_NOTICE};

/// Main entry point for the confab-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let (args, _) = ChatArgs::from_command_line_relaxed("confab-chat [OPTIONS]");
    let config = ChatConfig::from_environment(args)?;
    let renderer = PlainTextRenderer::with_color(config.use_color);
    let session = ChatSession::open(config, renderer)?;
    let mut rl = DefaultEditor::new()?;

    println!("confab (model: {})", session.config().model);
    println!("Type /help for commands, /quit to exit\n");
    if !session.controller().backend().credential_configured() {
        println!("{MISSING_CREDENTIAL_NOTICE}\n");
    }
    session.store().read(|store| {
        if let Some(conversation) = store.current_conversation() {
            session.with_renderer(|r| r.print_transcript(conversation));
        }
    });

    loop {
        match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);
                if session.handle_line(line).await == Flow::Quit {
                    println!("Goodbye!");
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {err:?}");
                break;
            }
        }
    }

    Ok(())
}
