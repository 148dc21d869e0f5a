//! Configuration management for the session registry.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/ptyhive/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("default_cols must be greater than 0, got {0}")]
    InvalidCols(u16),

    #[error("default_rows must be greater than 0, got {0}")]
    InvalidRows(u16),

    #[error("max_bytes must be greater than 0, got {0}")]
    InvalidMaxBytes(u64),

    #[error("default_shell path does not exist: {0}")]
    InvalidShellPath(String),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the session registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General registry configuration.
    pub registry: RegistryConfig,

    /// Defaults applied to newly created sessions.
    pub session: SessionConfig,

    /// Output buffer configuration.
    pub buffer: BufferConfig,
}

/// General registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Defaults applied to newly created sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Default shell to use for new sessions.
    pub default_shell: String,

    /// Default terminal width in columns.
    pub default_cols: u16,

    /// Default terminal height in rows.
    pub default_rows: u16,
}

/// Output buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BufferConfig {
    /// Upper bound on buffered output per session in bytes. Unset means the
    /// buffer grows without limit; when set, the oldest bytes are dropped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bytes: Option<u64>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_shell: default_shell(),
            default_cols: 80,
            default_rows: 24,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ptyhive")
        .join("config.toml")
}

/// Returns the default shell for the current platform.
fn default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - PTYHIVE_DEFAULT_SHELL: Override the default shell
    /// - PTYHIVE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(shell) = std::env::var("PTYHIVE_DEFAULT_SHELL") {
            if !shell.is_empty() {
                tracing::info!(
                    "Overriding default_shell from environment: {}",
                    shell
                );
                self.session.default_shell = shell;
            }
        }

        if let Ok(level) = std::env::var("PTYHIVE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!(
                    "Overriding log_level from environment: {}",
                    level
                );
                self.registry.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate default_cols: > 0
        if self.session.default_cols == 0 {
            return Err(ConfigError::InvalidCols(self.session.default_cols));
        }

        // Validate default_rows: > 0
        if self.session.default_rows == 0 {
            return Err(ConfigError::InvalidRows(self.session.default_rows));
        }

        // Validate max_bytes when set: > 0
        if let Some(max_bytes) = self.buffer.max_bytes {
            if max_bytes == 0 {
                return Err(ConfigError::InvalidMaxBytes(max_bytes));
            }
        }

        // Validate default_shell path exists
        let shell_path = std::path::Path::new(&self.session.default_shell);

        // Check if it's an absolute path that exists
        if shell_path.is_absolute() {
            if !shell_path.exists() {
                return Err(ConfigError::InvalidShellPath(
                    self.session.default_shell.clone(),
                ));
            }
        } else {
            // For non-absolute paths, try to find in PATH
            if which::which(&self.session.default_shell).is_err() {
                return Err(ConfigError::InvalidShellPath(
                    self.session.default_shell.clone(),
                ));
            }
        }

        // Validate log_level is a known value
        let level = self.registry.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(
                self.registry.log_level.clone(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    ///
    /// The default path is `~/.config/ptyhive/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<()> {
        self.save(default_config_path())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.registry.log_level, "info");
        assert!(!config.session.default_shell.is_empty());
        assert_eq!(config.session.default_cols, 80);
        assert_eq!(config.session.default_rows, 24);
        assert_eq!(config.buffer.max_bytes, None);
    }

    #[test]
    fn test_default_registry_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert!(!config.default_shell.is_empty());
        assert!(config.default_cols > 0);
        assert!(config.default_rows > 0);
    }

    #[test]
    fn test_default_buffer_config() {
        let config = BufferConfig::default();
        assert!(config.max_bytes.is_none());
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[registry]
log_level = "debug"

[session]
default_cols = 132
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.registry.log_level, "debug");
        assert_eq!(config.session.default_cols, 132);
        // Other values should be defaults
        assert_eq!(config.session.default_rows, 24);
        assert_eq!(config.buffer.max_bytes, None);
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[registry]
log_level = "trace"

[session]
default_shell = "/bin/zsh"
default_cols = 120
default_rows = 40

[buffer]
max_bytes = 1048576
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.registry.log_level, "trace");
        assert_eq!(config.session.default_shell, "/bin/zsh");
        assert_eq!(config.session.default_cols, 120);
        assert_eq!(config.session.default_rows, 40);
        assert_eq!(config.buffer.max_bytes, Some(1048576));
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let toml = r#"
[registry
log_level = "debug"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[session]
default_cols = "not a number"
"#;
        let result = Config::from_toml(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_toml_unknown_fields_ignored() {
        let toml = r#"
[registry]
log_level = "warn"
unknown_field = "ignored"

[unknown_section]
foo = "bar"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.registry.log_level, "warn");
    }

    #[test]
    fn test_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();

        assert!(toml.contains("[registry]"));
        assert!(toml.contains("[session]"));
        // An unset cap never appears in the serialized form.
        assert!(!toml.contains("max_bytes"));
    }

    #[test]
    fn test_to_toml_with_buffer_cap() {
        let mut config = Config::default();
        config.buffer.max_bytes = Some(4096);

        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[buffer]"));
        assert!(toml.contains("max_bytes = 4096"));
    }

    #[test]
    fn test_roundtrip() {
        let original = Config::default();
        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.registry.log_level = "warn".to_string();
        original.session.default_cols = 132;
        original.session.default_rows = 50;
        original.buffer.max_bytes = Some(65536);

        let toml = original.to_toml().unwrap();
        let loaded = Config::from_toml(&toml).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let mut original = Config::default();
        original.registry.log_level = "debug".to_string();
        original.session.default_cols = 100;

        original.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_save_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir
            .path()
            .join("nested")
            .join("dirs")
            .join("config.toml");

        let config = Config::default();
        config.save(&config_path).unwrap();

        assert!(config_path.exists());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(&config_path, "invalid [ toml").unwrap();

        let result = Config::load(&config_path);
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("ptyhive"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_default_shell() {
        let shell = default_shell();
        assert!(!shell.is_empty());
        if cfg!(windows) {
            assert!(shell.contains("powershell"));
        }
    }

    #[test]
    fn test_config_equality() {
        let config1 = Config::default();
        let config2 = Config::default();
        assert_eq!(config1, config2);

        let mut config3 = Config::default();
        config3.registry.log_level = "error".to_string();
        assert_ne!(config1, config3);
    }

    #[test]
    #[serial]
    fn test_env_override_default_shell() {
        std::env::set_var("PTYHIVE_DEFAULT_SHELL", "/bin/dash");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.session.default_shell, "/bin/dash");

        std::env::remove_var("PTYHIVE_DEFAULT_SHELL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("PTYHIVE_DEFAULT_SHELL", "");

        let mut config = Config::default();
        let original_shell = config.session.default_shell.clone();

        config.apply_env_overrides();

        assert_eq!(config.session.default_shell, original_shell);

        std::env::remove_var("PTYHIVE_DEFAULT_SHELL");
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("PTYHIVE_DEFAULT_SHELL");
        std::env::remove_var("PTYHIVE_LOG_LEVEL");

        let mut config = Config::default();
        let original = config.clone();

        config.apply_env_overrides();

        assert_eq!(config, original);
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var("PTYHIVE_DEFAULT_SHELL");
        std::env::set_var("PTYHIVE_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.registry.log_level, "debug");

        std::env::remove_var("PTYHIVE_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level_empty_does_not_override() {
        std::env::remove_var("PTYHIVE_DEFAULT_SHELL");
        std::env::set_var("PTYHIVE_LOG_LEVEL", "");

        let mut config = Config::default();
        let original_level = config.registry.log_level.clone();

        config.apply_env_overrides();

        assert_eq!(config.registry.log_level, original_level);

        std::env::remove_var("PTYHIVE_LOG_LEVEL");
    }

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_cols() {
        let mut config = Config::default();
        config.session.default_cols = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidCols(0)));
    }

    #[test]
    fn test_validate_zero_rows() {
        let mut config = Config::default();
        config.session.default_rows = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidRows(0)));
    }

    #[test]
    fn test_validate_zero_max_bytes() {
        let mut config = Config::default();
        config.buffer.max_bytes = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxBytes(0)));
    }

    #[test]
    fn test_validate_boundary_values() {
        let mut config = Config::default();

        // Smallest valid terminal
        config.session.default_cols = 1;
        config.session.default_rows = 1;
        assert!(config.validate().is_ok());

        // Smallest valid cap
        config.buffer.max_bytes = Some(1);
        assert!(config.validate().is_ok());

        // Unset cap is always valid
        config.buffer.max_bytes = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_shell_path_absolute_exists() {
        let mut config = Config::default();
        // Use a shell that should exist on most Unix systems
        config.session.default_shell = "/bin/sh".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    #[cfg(windows)]
    fn test_validate_shell_path_absolute_exists_windows() {
        let mut config = Config::default();
        config.session.default_shell = "C:\\Windows\\System32\\cmd.exe".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_shell_path_absolute_not_exists() {
        let mut config = Config::default();
        config.session.default_shell = "/nonexistent/path/to/shell".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(
                "/nonexistent/path/to/shell".to_string()
            ))
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_shell_path_in_path() {
        let mut config = Config::default();
        // "sh" should be in PATH on most Unix systems
        config.session.default_shell = "sh".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_shell_path_not_in_path() {
        let mut config = Config::default();
        config.session.default_shell = "nonexistent_shell_xyz".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidShellPath(
                "nonexistent_shell_xyz".to_string()
            ))
        );
    }

    #[test]
    fn test_validate_log_levels() {
        let mut config = Config::default();

        for level in ["trace", "debug", "info", "warn", "error"] {
            config.registry.log_level = level.to_string();
            assert!(config.validate().is_ok(), "level {level} should be valid");
        }
    }

    #[test]
    fn test_validate_log_level_case_insensitive() {
        let mut config = Config::default();

        config.registry.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());

        config.registry.log_level = "Info".to_string();
        assert!(config.validate().is_ok());

        config.registry.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level_invalid() {
        let mut config = Config::default();
        config.registry.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_validate_log_level_empty() {
        let mut config = Config::default();
        config.registry.log_level = "".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_log_level_typo() {
        let mut config = Config::default();
        config.registry.log_level = "warning".to_string(); // common typo
        assert!(config.validate().is_err());
    }
}
