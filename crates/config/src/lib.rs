//! Configuration loading, validation, and management for Falcon.
//!
//! Loads configuration from `~/.falcon/config.toml` (or the file named by
//! `FALCON_CONFIG`) with environment variable overrides. Validates all
//! settings at startup; the resulting [`AppConfig`] is passed explicitly
//! into every constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default OpenAI-compatible endpoint (Groq).
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1";

/// The root configuration structure.
///
/// Maps directly to `~/.falcon/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the reasoning API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name used in logs
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Assistant persona configuration
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Speech playback configuration
    #[serde(default)]
    pub speech: SpeechConfig,

    /// External collaborators backing the side-effecting tools
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "groq".into()
}
fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}
fn default_model() -> String {
    "llama-3.3-70b-versatile".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("identity", &self.identity)
            .field("memory", &self.memory)
            .field("speech", &self.speech)
            .field("collaborators", &self.collaborators)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Name the assistant uses for itself
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,

    /// Name of the person being assisted (falls back to `USERNAME`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,

    /// Override the system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_assistant_name() -> String {
    "Falcon".into()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            assistant_name: default_assistant_name(),
            user_name: None,
            system_prompt_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database file; defaults to `~/.falcon/falcon.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    /// Completed turns replayed into every reasoning context
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Notes pulled in by the retrieval primer
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Conversation matches considered when summarizing a topic
    #[serde(default = "default_topic_search_limit")]
    pub topic_search_limit: usize,

    /// Completed turns shown by the history view
    #[serde(default = "default_history_page")]
    pub history_page: usize,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_history_turns() -> usize {
    3
}
fn default_recall_limit() -> usize {
    5
}
fn default_topic_search_limit() -> usize {
    10
}
fn default_history_page() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            database_path: None,
            history_turns: default_history_turns(),
            recall_limit: default_recall_limit(),
            topic_search_limit: default_topic_search_limit(),
            history_page: default_history_page(),
        }
    }
}

impl MemoryConfig {
    /// Resolved path (or `sqlite::memory:` URL) of the database.
    pub fn resolved_database_path(&self) -> String {
        self.database_path.clone().unwrap_or_else(|| {
            AppConfig::config_dir()
                .join("falcon.db")
                .to_string_lossy()
                .into_owned()
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speak replies at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// "command" (external processes) or "simulated" (silent, timed)
    #[serde(default = "default_speech_engine")]
    pub engine: String,

    /// Program + args that speak `{text}` directly (used when no
    /// synthesizer is configured)
    #[serde(default = "default_speak_command")]
    pub speak_command: Vec<String>,

    /// Program + args that render `{text}` into the file `{output}`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synthesize_command: Vec<String>,

    /// Program + args that play the file `{output}`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub player_command: Vec<String>,

    /// How often a playback task checks for cancellation
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long `speak` waits for the previous session to wind down
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Speaking rate used by the simulated engine
    #[serde(default = "default_words_per_minute")]
    pub words_per_minute: u32,
}

fn default_speech_engine() -> String {
    "command".into()
}
fn default_speak_command() -> Vec<String> {
    vec!["espeak".into(), "{text}".into()]
}
fn default_poll_interval_ms() -> u64 {
    20
}
fn default_join_timeout_ms() -> u64 {
    2000
}
fn default_words_per_minute() -> u32 {
    170
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: default_speech_engine(),
            speak_command: default_speak_command(),
            synthesize_command: Vec::new(),
            player_command: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            words_per_minute: default_words_per_minute(),
        }
    }
}

/// An external program invoked with an argument template.
///
/// Each element of `args` may contain the `{input}` placeholder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
}

fn default_command_timeout() -> u64 {
    60
}

/// Collaborators left unset are reported to the model as disabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_executor: Option<CommandConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_generator: Option<CommandConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_generator: Option<CommandConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub music_player: Option<CommandConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `FALCON_CONFIG` or the default path
    /// (~/.falcon/config.toml), then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("FALCON_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
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

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// API key sources, highest priority first:
    /// - `FALCON_API_KEY`
    /// - `GROQ_API_KEY`
    /// - `OPENAI_API_KEY`
    ///
    /// A key in the config file wins over all of them.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("FALCON_API_KEY")
                .or_else(|| lookup("GROQ_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"))
                .filter(|k| !k.trim().is_empty());
        }

        if let Some(model) = lookup("FALCON_MODEL") {
            self.default_model = model;
        }

        if let Some(url) = lookup("FALCON_BASE_URL") {
            self.api_url = url;
        }

        if self.identity.user_name.is_none() {
            self.identity.user_name = lookup("USERNAME").or_else(|| lookup("USER"));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".falcon")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.memory.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "memory.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.memory.backend
            )));
        }

        if self.memory.history_turns == 0
            || self.memory.recall_limit == 0
            || self.memory.topic_search_limit == 0
            || self.memory.history_page == 0
        {
            return Err(ConfigError::ValidationError(
                "memory limits must be greater than 0".into(),
            ));
        }

        if !matches!(self.speech.engine.as_str(), "command" | "simulated") {
            return Err(ConfigError::ValidationError(format!(
                "speech.engine must be \"command\" or \"simulated\", got \"{}\"",
                self.speech.engine
            )));
        }

        if self.speech.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "speech.poll_interval_ms must be > 0".into(),
            ));
        }

        if self.speech.poll_interval_ms >= self.speech.join_timeout_ms {
            return Err(ConfigError::ValidationError(
                "speech.poll_interval_ms must be shorter than speech.join_timeout_ms".into(),
            ));
        }

        if self.speech.engine == "command"
            && self.speech.synthesize_command.is_empty()
            && self.speech.speak_command.is_empty()
        {
            return Err(ConfigError::ValidationError(
                "speech.speak_command or speech.synthesize_command must be set for the command engine".into(),
            ));
        }

        if !self.speech.synthesize_command.is_empty() && self.speech.player_command.is_empty() {
            return Err(ConfigError::ValidationError(
                "speech.player_command is required when speech.synthesize_command is set".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            identity: IdentityConfig::default(),
            memory: MemoryConfig::default(),
            speech: SpeechConfig::default(),
            collaborators: CollaboratorsConfig::default(),
            gateway: GatewayConfig::default(),
        }
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
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
