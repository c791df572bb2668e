//! Configuration management for Phaseflow.
//!
//! Handles loading configuration from TOML files and the environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::integrations::{
    ConsoleRelay, FanoutRelay, HttpPhaseGateway, NotificationRelay, TracingRelay, WebhookRelay,
};
use crate::workflow::{
    default_definitions, CoordinatorOptions, PhaseChain, PhaseDefinition, WorkflowError,
    DEFAULT_FALLBACK_MESSAGE,
};

/// Local config file name.
pub const LOCAL_CONFIG_FILE: &str = ".phaseflow.toml";

/// Environment variable overriding `api.base_url`.
pub const API_URL_ENV: &str = "PHASEFLOW_API_URL";

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Error types for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid phase chain: {0}")]
    Phases(#[from] WorkflowError),

    #[error("Invalid API base URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid timeout: must be at least one second")]
    InvalidTimeout,

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Workflow API settings
    pub api: ApiConfig,

    /// Phase chain
    pub workflow: WorkflowConfig,

    /// Outcome banners
    pub notifications: NotificationsConfig,

    /// Local session memory
    pub session: SessionConfig,
}

/// Workflow API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://localhost:5000/api`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Name of the environment variable holding the bearer token
    pub token_env: String,
}

/// Phase chain settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Phases in order
    pub phases: Vec<PhaseDefinition>,
}

/// Notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Print banners to the console
    pub console: bool,

    /// Banner text when the backend sends no message
    pub fallback_message: String,

    /// Show an error banner when navigation hits a locked phase
    pub announce_locked_phase: bool,

    /// Webhook receiving every outcome
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

/// Session memory settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Reopen the last phase viewed per project
    pub remember_phase: bool,

    /// Session file override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_secs: 30,
            token_env: "PHASEFLOW_API_TOKEN".to_string(),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { phases: default_definitions() }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            console: true,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            announce_locked_phase: false,
            webhook_url: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { remember_phase: true, path: None }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.phaseflow.toml` in current directory
    /// 2. `~/.config/phaseflow/config.toml`
    /// 3. Falls back to defaults
    ///
    /// Environment overrides are applied on top.
    pub fn load() -> ConfigResult<Self> {
        let mut config = match Self::locate() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from the default location.
    pub fn load_with(path: Option<&Path>) -> ConfigResult<Self> {
        let Some(path) = path else {
            return Self::load();
        };
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file, without overrides.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Path of the config file `load` would read, if any.
    pub fn locate() -> Option<PathBuf> {
        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Some(local_config);
        }

        Self::config_dir().map(|d| d.join("config.toml")).filter(|p| p.exists())
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!(url = %url, "API base URL overridden from environment");
                self.api.base_url = url.trim().to_string();
            }
        }
    }

    /// Check values that would otherwise fail later.
    pub fn validate(&self) -> ConfigResult<()> {
        let url = self.api.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        self.phase_chain()?;
        Ok(())
    }

    /// Serialize as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Build the configured phase chain.
    pub fn phase_chain(&self) -> ConfigResult<PhaseChain> {
        Ok(PhaseChain::new(self.workflow.phases.clone())?)
    }

    /// Coordinator options from the notification settings.
    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            fallback_message: self.notifications.fallback_message.clone(),
            announce_locked_phase: self.notifications.announce_locked_phase,
        }
    }

    /// Bearer token from the configured environment variable.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(&self.api.token_env).ok().filter(|t| !t.trim().is_empty())
    }

    /// Build the HTTP gateway.
    pub fn gateway(&self) -> ConfigResult<HttpPhaseGateway> {
        let gateway = HttpPhaseGateway::with_timeout(
            &self.api.base_url,
            Duration::from_secs(self.api.timeout_secs),
        )?;
        Ok(match self.api_token() {
            Some(token) => gateway.with_token(token),
            None => gateway,
        })
    }

    /// Build the notification relay.
    ///
    /// Console banners when enabled, the tracing log otherwise, plus the
    /// webhook when one is configured.
    pub fn relay(&self) -> Arc<dyn NotificationRelay> {
        let mut fanout = FanoutRelay::new();
        fanout = if self.notifications.console {
            fanout.with(Arc::new(ConsoleRelay))
        } else {
            fanout.with(Arc::new(TracingRelay))
        };

        if let Some(url) = &self.notifications.webhook_url {
            match WebhookRelay::new(url.clone()) {
                Ok(relay) => fanout = fanout.with(Arc::new(relay)),
                Err(e) => tracing::warn!(url = %url, error = %e, "Webhook relay disabled"),
            }
        }

        Arc::new(fanout)
    }

    /// Session file: the configured override or `<data_dir>/session.json`.
    pub fn session_path(&self) -> Option<PathBuf> {
        self.session.path.clone().or_else(|| Self::data_dir().map(|d| d.join("session.json")))
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("phaseflow"))
    }

    /// Get the data directory path (for session memory).
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("phaseflow"))
    }
}
