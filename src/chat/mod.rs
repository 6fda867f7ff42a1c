//! Terminal front end for confab.
//!
//! This module provides a line-oriented chat interface over the conversation store and the
//! streaming controller. It supports:
//!
//! - Replies echoed to the terminal as they stream into the store
//! - Slash commands for managing conversations, the sidebar, and the theme
//! - Configuration from arguments, a YAML file, and the environment
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: Command execution against the store and controller
//! - [`commands`]: Slash command parsing
//! - [`render`]: Terminal output

mod commands;
mod config;
mod render;
mod session;

pub use commands::{ChatCommand, ConversationRef, help_text, parse_command};
pub use config::{API_KEY_ENV, ChatArgs, ChatConfig, ConfigFile, FALLBACK_API_KEY_ENV};
pub use render::{PlainTextRenderer, Renderer, StreamEcho};
pub use session::{ChatSession, Flow};
