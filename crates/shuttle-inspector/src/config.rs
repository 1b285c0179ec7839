//! Configuration management for shuttle-inspector
//!
//! Configuration is stored in TOML format.
//!
//! # Configuration File Locations
//!
//! - Linux: `~/.config/shuttle-inspector/inspector.toml`
//! - macOS: `~/Library/Application Support/com.shuttlefare.shuttle-inspector/inspector.toml`
//! - Windows: `%APPDATA%\shuttlefare\shuttle-inspector\config\inspector.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Inspector configuration
///
/// # Example TOML
///
/// ```toml
/// [api]
/// base_url = "https://api.example.com"
/// token = ""
/// timeout_seconds = 15
///
/// [inspector]
/// name = "Ana Reyes"
///
/// [checkpoints]
/// db_path = ""  # Empty = default location
///
/// [nfc]
/// enabled = true
///
/// [output]
/// format = "table"  # "table" | "json" | "quiet"
///
/// [logging]
/// level = "warn"
/// file = ""
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub inspector: InspectorConfig,

    #[serde(default)]
    pub checkpoints: CheckpointsConfig,

    #[serde(default)]
    pub nfc: NfcConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token (empty = none; SHUTTLE_API_TOKEN or --token override)
    #[serde(default)]
    pub token: String,

    /// Per-request timeout for balance checks and submission
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_timeout() -> u64 {
    15
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn token(&self) -> Option<String> {
        if self.token.trim().is_empty() {
            None
        } else {
            Some(self.token.trim().to_string())
        }
    }
}

/// Who is inspecting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectorConfig {
    #[serde(default)]
    pub name: String,
}

/// Checkpoint storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointsConfig {
    /// Path to checkpoint database (empty = default location)
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

/// Console NFC reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NfcConfig {
    /// Whether the reader starts switched on
    #[serde(default = "default_nfc_enabled")]
    pub enabled: bool,
}

fn default_nfc_enabled() -> bool {
    true
}

impl Default for NfcConfig {
    fn default() -> Self {
        Self {
            enabled: default_nfc_enabled(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json", "quiet"
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (empty = stderr only)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "shuttlefare", "shuttle-inspector")
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("inspector.toml"))
    }

    /// Get the data directory path (for checkpoints)
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Checkpoint database path, falling back to the data directory.
    pub fn checkpoint_db_path(&self) -> Option<PathBuf> {
        match &self.checkpoints.db_path {
            Some(path) if !path.as_os_str().is_empty() => Some(path.clone()),
            _ => Self::data_dir().map(|dir| dir.join("checkpoints.db")),
        }
    }

    /// Log file path, if file logging is configured.
    pub fn log_file(&self) -> Option<&Path> {
        self.logging
            .file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                let config = Self::default();
                config.save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api.base_url.as_str();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "Invalid API URL '{}': must start with http:// or https://",
                url
            )));
        }

        if self.api.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        let valid_formats = ["table", "json", "quiet"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format '{}'. Valid values: {:?}",
                self.output.format, valid_formats
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Generate a sample configuration file content
    pub fn sample_toml() -> &'static str {
        r#"# Shuttle Inspector Configuration

[api]
# Backend base URL
base_url = "http://localhost:3000/api"
# Bearer token (or set SHUTTLE_API_TOKEN)
token = ""
# Request timeout in seconds
timeout_seconds = 15

[inspector]
# Name recorded on submitted inspections
name = ""

[checkpoints]
# Path to checkpoint database (empty = default location)
# db_path = ""

[nfc]
# Whether the console reader starts switched on
enabled = true

[output]
# Output format: "table", "json", "quiet"
format = "table"

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
# Log file path (empty = stderr only)
# file = ""
"#
    }
}

/// CLI configuration overrides
///
/// Command-line arguments take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub inspector: Option<String>,
    pub output_format: Option<String>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
}

impl Config {
    /// Apply CLI overrides to configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref url) = overrides.api_url {
            self.api.base_url = url.clone();
        }
        if let Some(ref token) = overrides.token {
            if !token.is_empty() {
                self.api.token = token.clone();
            }
        }
        if let Some(ref name) = overrides.inspector {
            self.inspector.name = name.clone();
        }
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if overrides.verbose == Some(true) && self.logging.level != "debug" {
            self.logging.level = "info".to_string();
        }
        if overrides.debug == Some(true) {
            self.logging.level = "debug".to_string();
        }
        self
    }
}
