//! Configuration management for Overlap
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{OverlapError, Result};
use crate::storage::HISTORY_FILE_ENV;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure for Overlap
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend endpoint settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Request options sent with every turn
    #[serde(default)]
    pub chat: ChatConfig,

    /// Identity attached to requests
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Conversation history location
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Scheme, host and port of the backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the streaming conversation endpoint
    #[serde(default = "default_conversation_path")]
    pub conversation_path: String,

    /// Connect timeout (seconds); the streamed body itself is not timed out
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Upper bound on how much of an error body is read (bytes)
    #[serde(default = "default_max_error_body")]
    pub max_error_body_bytes: usize,
}

fn default_base_url() -> String {
    "http://localhost:1338".to_string()
}

fn default_conversation_path() -> String {
    "/backend-api/v2/conversation".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_error_body() -> usize {
    8_192 // 8 KB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            conversation_path: default_conversation_path(),
            connect_timeout_seconds: default_connect_timeout(),
            max_error_body_bytes: default_max_error_body(),
        }
    }
}

impl ServerConfig {
    /// Full URL of the conversation endpoint
    ///
    /// # Errors
    ///
    /// Returns `OverlapError::Config` if the joined URL does not parse
    pub fn endpoint(&self) -> Result<Url> {
        let joined = format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.conversation_path
        );
        Url::parse(&joined).map_err(|e| {
            OverlapError::Config(format!("Invalid endpoint URL '{}': {}", joined, e)).into()
        })
    }
}

/// Options sent with each conversation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Prompt preset name understood by the backend
    #[serde(default = "default_jailbreak")]
    pub jailbreak: String,

    /// Let the backend consult the web
    #[serde(default)]
    pub internet_access: bool,

    /// Optional key forwarded to the backend
    #[serde(default)]
    pub api_key: Option<String>,

    /// Answer locally instead of calling the backend
    #[serde(default)]
    pub mock: bool,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_jailbreak() -> String {
    "default".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            jailbreak: default_jailbreak(),
            internet_access: false,
            api_key: None,
            mock: false,
        }
    }
}

/// Identity attached to requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub user_email: Option<String>,

    #[serde(default)]
    pub team_id: Option<String>,
}

/// Conversation history storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// History file; the platform data directory is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OverlapError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| OverlapError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("OVERLAP_BASE_URL") {
            self.server.base_url = base_url;
        }

        if let Ok(model) = std::env::var("OVERLAP_MODEL") {
            self.chat.model = model;
        }

        if let Ok(api_key) = std::env::var("OVERLAP_API_KEY") {
            self.chat.api_key = Some(api_key);
        }

        if let Some(value) = env_bool("OVERLAP_INTERNET_ACCESS") {
            self.chat.internet_access = value;
        }

        if let Some(value) = env_bool("OVERLAP_MOCK") {
            self.chat.mock = value;
        }

        // Identity overrides
        if let Ok(user_id) = std::env::var("OVERLAP_USER_ID") {
            self.identity.user_id = Some(user_id);
        }

        if let Ok(email) = std::env::var("OVERLAP_USER_EMAIL") {
            self.identity.user_email = Some(email);
        }

        if let Ok(team_id) = std::env::var("OVERLAP_TEAM_ID") {
            self.identity.team_id = Some(team_id);
        }

        if let Ok(history) = std::env::var(HISTORY_FILE_ENV) {
            if !history.is_empty() {
                self.storage.path = Some(PathBuf::from(history));
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(base_url) = &cli.base_url {
            self.server.base_url = base_url.clone();
        }

        if let Some(path) = &cli.storage_path {
            self.storage.path = Some(path.clone());
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.server.base_url).map_err(|e| {
            OverlapError::Config(format!(
                "Invalid server.base_url '{}': {}",
                self.server.base_url, e
            ))
        })?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(OverlapError::Config(format!(
                "server.base_url must use http or https, got '{}'",
                base.scheme()
            ))
            .into());
        }

        if !self.server.conversation_path.starts_with('/') {
            return Err(OverlapError::Config(
                "server.conversation_path must start with '/'".to_string(),
            )
            .into());
        }

        if self.server.connect_timeout_seconds == 0 {
            return Err(OverlapError::Config(
                "server.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.server.max_error_body_bytes == 0 {
            return Err(OverlapError::Config(
                "server.max_error_body_bytes must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.model.trim().is_empty() {
            return Err(OverlapError::Config("chat.model cannot be empty".to_string()).into());
        }

        Ok(())
    }
}

/// Read a boolean environment variable, ignoring (and logging) bad values
fn env_bool(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!("Invalid {}: {}", name, raw);
            None
        }
    }
}
