//! Configuration loading, validation, and management for mastomend.
//!
//! Credentials come from environment variables only and are required; the
//! process must not start without them. Tunables come from an optional TOML
//! file (`mastomend.toml` in the working directory, `~/.mastomend/config.toml`,
//! or the path in `MASTOMEND_CONFIG`) with environment variable overrides.
//! Everything is loaded once at startup into immutable values that are passed
//! to components explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use mastomend_core::Visibility;

/// Required secrets and identifiers, sourced from the environment.
///
/// Never placed in the config file and never serialized.
#[derive(Clone)]
pub struct Credentials {
    /// API key for the LLM completion API (`GEMINI_API_KEY`)
    pub llm_api_key: String,

    /// Bearer token for the social network (`MASTODON_ACCESS_TOKEN`)
    pub social_access_token: String,

    /// Base URL of the social network server (`MASTODON_API_BASE_URL`)
    pub social_base_url: String,

    /// The bot's own handle, used to prevent self-replies (`BOT_USERNAME`)
    pub bot_username: String,
}

impl Credentials {
    pub const ENV_LLM_API_KEY: &'static str = "GEMINI_API_KEY";
    pub const ENV_ACCESS_TOKEN: &'static str = "MASTODON_ACCESS_TOKEN";
    pub const ENV_BASE_URL: &'static str = "MASTODON_API_BASE_URL";
    pub const ENV_BOT_USERNAME: &'static str = "BOT_USERNAME";

    /// Load all required credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials through an injectable lookup, so tests never touch
    /// the real environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| -> Result<String, ConfigError> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => Err(ConfigError::MissingEnv(key)),
            }
        };

        let credentials = Self {
            llm_api_key: require(Self::ENV_LLM_API_KEY)?,
            social_access_token: require(Self::ENV_ACCESS_TOKEN)?,
            social_base_url: require(Self::ENV_BASE_URL)?
                .trim_end_matches('/')
                .to_string(),
            bot_username: require(Self::ENV_BOT_USERNAME)?
                .trim_start_matches('@')
                .to_string(),
        };

        if !credentials.social_base_url.starts_with("http://")
            && !credentials.social_base_url.starts_with("https://")
        {
            return Err(ConfigError::ValidationError(format!(
                "{} must be an http(s) URL",
                Self::ENV_BASE_URL
            )));
        }

        Ok(credentials)
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &str) -> &'static str {
    if s.is_empty() { "None" } else { "[REDACTED]" }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &redact(&self.llm_api_key))
            .field("social_access_token", &redact(&self.social_access_token))
            .field("social_base_url", &self.social_base_url)
            .field("bot_username", &self.bot_username)
            .finish()
    }
}

/// The root tunable configuration.
///
/// Maps directly to the optional `mastomend.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Stream connection settings
    #[serde(default)]
    pub stream: StreamConfig,

    /// Reply policy settings
    #[serde(default)]
    pub policy: PolicyConfig,

    /// LLM completion settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Reply composition settings
    #[serde(default)]
    pub reply: ReplyConfig,

    /// Persona settings
    #[serde(default)]
    pub persona: PersonaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Which timeline to watch: "public", "public:local", or "user"
    #[serde(default = "default_timeline")]
    pub timeline: String,

    /// Cap on the reconnect backoff delay
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
}

fn default_timeline() -> String {
    "public".into()
}
fn default_reconnect_max_secs() -> u64 {
    60
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeline: default_timeline(),
            reconnect_max_secs: default_reconnect_max_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Visibilities the bot will answer. Default: public only.
    #[serde(default = "default_visibilities")]
    pub visibilities: Vec<Visibility>,

    /// Reply only when the cleaned body contains at least one of these
    /// markers. Empty = no requirement.
    #[serde(default)]
    pub require_any: Vec<String>,

    /// Never reply when the cleaned body contains any of these markers.
    #[serde(default)]
    pub deny: Vec<String>,

    /// Also answer mention notifications (the user stream delivers them)
    #[serde(default)]
    pub reply_to_mentions: bool,

    /// Answer statuses that are themselves replies
    #[serde(default)]
    pub include_replies: bool,

    /// Skip accounts that self-identify as automated
    #[serde(default = "default_true")]
    pub skip_bot_accounts: bool,
}

fn default_visibilities() -> Vec<Visibility> {
    vec![Visibility::Public]
}
fn default_true() -> bool {
    true
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            visibilities: default_visibilities(),
            require_any: vec![],
            deny: vec![],
            reply_to_mentions: false,
            include_replies: false,
            skip_bot_accounts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// The model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the completion API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Cap on generated tokens
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry budget for rate-limited calls
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_model() -> String {
    "gemini-1.5-flash".into()
}
fn default_llm_base_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    256
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_llm_base_url(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// The server's status length limit
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Prefix replies with `@author `
    #[serde(default = "default_true")]
    pub mention_author: bool,

    /// How many replied-to status ids to remember for deduplication
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,

    /// Additional posting attempts after a transient failure
    #[serde(default = "default_publish_retries")]
    pub max_retries: u32,
}

fn default_max_chars() -> usize {
    500
}
fn default_dedup_capacity() -> usize {
    1024
}
fn default_publish_retries() -> u32 {
    3
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            mention_author: true,
            dedup_capacity: default_dedup_capacity(),
            max_retries: default_publish_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersonaConfig {
    /// Override the system instruction entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Load the system instruction from a file (inline override wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_file: Option<String>,
}

/// The built-in persona: a brief, supportive listener.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a compassionate and insightful psychologist bot. Your goal is to offer \
brief, supportive, and potentially thought-provoking comments based on the \
user's post. Keep your responses concise, typically one or two sentences. \
Focus on empathy, validation, or gentle reframing. Do not give direct advice \
or diagnosis. Avoid overly clinical language. If the post seems like a cry for \
help or indicates immediate danger, gently suggest seeking professional help \
or contacting emergency services, but do not attempt to handle the crisis \
yourself.";

impl PersonaConfig {
    /// Resolve the effective system instruction: inline override, then file,
    /// then the built-in default.
    pub fn resolve(&self) -> Result<String, ConfigError> {
        if let Some(prompt) = &self.system_prompt {
            return Ok(prompt.clone());
        }
        if let Some(path) = &self.system_prompt_file {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                    path: PathBuf::from(path),
                    reason: e.to_string(),
                })?;
            return Ok(content.trim().to_string());
        }
        Ok(DEFAULT_SYSTEM_PROMPT.to_string())
    }
}

impl AppConfig {
    /// Load configuration from the default search path.
    ///
    /// `MASTOMEND_CONFIG` names an explicit file; otherwise `mastomend.toml`
    /// in the working directory is tried, then `~/.mastomend/config.toml`.
    /// Environment overrides applied afterwards:
    /// - `MASTOMEND_MODEL` overrides `llm.model`
    /// - `MASTOMEND_TIMELINE` overrides `stream.timeline`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load configuration, preferring an explicitly requested file.
    ///
    /// An explicit path that does not exist is an error; a missing file on
    /// the default search path just means defaults. Environment overrides
    /// apply either way.
    pub fn load_with(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::ReadError {
                        path: path.to_path_buf(),
                        reason: "file not found".into(),
                    });
                }
                path.to_path_buf()
            }
            None => match std::env::var("MASTOMEND_CONFIG") {
                Ok(from_env) => PathBuf::from(from_env),
                Err(_) => {
                    let local = PathBuf::from("mastomend.toml");
                    if local.exists() {
                        local
                    } else {
                        Self::config_dir().join("config.toml")
                    }
                }
            },
        };
        let mut config = Self::load_from(&path)?;

        if let Ok(model) = std::env::var("MASTOMEND_MODEL") {
            config.llm.model = model;
        }
        if let Ok(timeline) = std::env::var("MASTOMEND_TIMELINE") {
            config.stream.timeline = timeline;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mastomend")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.policy.visibilities.is_empty() {
            return Err(ConfigError::ValidationError(
                "policy.visibilities must list at least one visibility".into(),
            ));
        }

        if self.reply.max_chars < 20 {
            return Err(ConfigError::ValidationError(
                "reply.max_chars is too small to fit a mention and any text".into(),
            ));
        }

        if self.reply.dedup_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "reply.dedup_capacity must be at least 1".into(),
            ));
        }

        match self.stream.timeline.as_str() {
            "public" | "public:local" | "user" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "stream.timeline must be \"public\", \"public:local\", or \"user\", got \"{other}\""
                )));
            }
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
