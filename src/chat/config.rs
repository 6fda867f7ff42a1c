//! Configuration types for the chat application.
//!
//! Settings come from four places, highest priority first: command-line arguments (`arrrg`), an
//! optional YAML file named with `--config`, the environment, and built-in defaults.

use std::path::PathBuf;

use arrrg_derive::CommandLine;
use serde::Deserialize;
use url::Url;

use crate::client::{Completions, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_REFERER};
use crate::error::{Error, Result};

/// Primary environment variable holding the API key.
pub const API_KEY_ENV: &str = "CONFAB_API_KEY";

/// Consulted when [`API_KEY_ENV`] is unset.
pub const FALLBACK_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Command-line arguments for the confab-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Model to request completions from.
    #[arrrg(optional, "Model to use (default: anthropic/claude-3.5-sonnet)", "MODEL")]
    pub model: Option<String>,

    /// Chat completions endpoint.
    #[arrrg(optional, "Chat completions endpoint URL", "URL")]
    pub endpoint: Option<String>,

    /// Origin marker sent with every request.
    #[arrrg(optional, "HTTP-Referer sent with requests", "URL")]
    pub referer: Option<String>,

    /// Directory holding the persisted conversations.
    #[arrrg(optional, "Directory for persisted conversations", "DIR")]
    pub data_dir: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "FILE")]
    pub config: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Contents of a YAML configuration file.  Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub referer: Option<String>,
    pub data_dir: Option<String>,
    pub api_key: Option<String>,
    #[serde(default)]
    pub no_color: bool,
}

impl ConfigFile {
    /// Parse a YAML document.
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|err| Error::io(format!("failed to read config {path}"), err))?;
        Self::parse(&yaml)
    }
}

/// Resolved configuration for a chat session.
#[derive(Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub referer: String,
    pub data_dir: PathBuf,
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values and no API key.
    pub fn new() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            data_dir: PathBuf::from(".confab"),
            use_color: true,
        }
    }

    /// Resolve arguments against the process environment and any config file they name.
    pub fn from_environment(args: ChatArgs) -> Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => Some(ConfigFile::load(path)?),
            None => None,
        };
        Self::resolve(args, file, |name| std::env::var(name).ok())
    }

    /// Resolve arguments, an optional config file, and an environment lookup.
    pub fn resolve(
        args: ChatArgs,
        file: Option<ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file = file.unwrap_or_default();
        let api_key = env(API_KEY_ENV)
            .or_else(|| env(FALLBACK_API_KEY_ENV))
            .or(file.api_key);
        let data_dir = args
            .data_dir
            .or(file.data_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir(&env));
        let defaults = Self::new();
        let config = Self {
            api_key,
            model: args.model.or(file.model).unwrap_or(defaults.model),
            endpoint: args.endpoint.or(file.endpoint).unwrap_or(defaults.endpoint),
            referer: args.referer.or(file.referer).unwrap_or(defaults.referer),
            data_dir,
            use_color: !(args.no_color || file.no_color),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the endpoint is an http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let endpoint = Url::parse(&self.endpoint)?;
        match endpoint.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(Error::validation(
                format!("endpoint must be http or https, not {scheme}"),
                Some("endpoint".to_string()),
            )),
        }
    }

    /// Build the completion client these settings describe.
    pub fn client(&self) -> Result<Completions> {
        Completions::with_options(
            self.api_key.clone(),
            Some(self.endpoint.clone()),
            Some(self.model.clone()),
            Some(self.referer.clone()),
            None,
        )
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the completions endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the referer.
    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = referer.into();
        self
    }

    /// Sets where conversations are persisted.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

// Hand-written so the API key never lands in logs.
impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("referer", &self.referer)
            .field("data_dir", &self.data_dir)
            .field("use_color", &self.use_color)
            .finish()
    }
}

/// `$XDG_DATA_HOME/confab`, else `$HOME/.local/share/confab`, else `.confab`.
fn default_data_dir(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(xdg) = env("XDG_DATA_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(xdg).join("confab");
    }
    if let Some(home) = env("HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(home).join(".local/share/confab");
    }
    PathBuf::from(".confab")
}
