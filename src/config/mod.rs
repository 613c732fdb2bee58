//! Configuration module for lumass-core
//!
//! Holds the settings of the controller host: where process plugins live,
//! how model files are indented, logging and the bridge channel sizes.
//!
//! # Locations
//!
//! - Configuration: `<config dir>/lumass/config.toml`
//!   (`~/.config/lumass/` on Linux)
//! - Plugins: `<data dir>/lumass/plugins/`
//!   (`~/.local/share/lumass/plugins/` on Linux)
//!
//! # Example
//!
//! ```ignore
//! use lumass_core::config::ControllerConfig;
//!
//! let mut config = ControllerConfig::load_or_default(ControllerConfig::default_path()?);
//! config.indent = 4;
//! config.save("lumass.toml")?;
//! ```

use crate::controller::bridge::{CMD_CHANNEL_CAPACITY, EVENT_CHANNEL_CAPACITY};
use crate::error::{LumassError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name under the platform config and data directories
pub const APP_ID: &str = "lumass";

/// Configuration filename
pub const CONFIG_FILE: &str = "config.toml";

/// Model file extension
pub const MODEL_FILE_EXTENSION: &str = "lmx";

/// Default log filter when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_FILTER: &str = "info,lumass_core=debug";

/// Default indentation of written model files
pub const DEFAULT_INDENT: usize = 2;

// ==================== Directories ====================

/// Platform configuration directory for lumass
pub fn config_dir() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID))
}

/// Platform data directory for lumass
pub fn data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Directory scanned for process plugins when none is configured
pub fn default_plugin_dir() -> Option<PathBuf> {
    data_dir().map(|p| p.join("plugins"))
}

/// Ensure the configuration directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().ok_or_else(|| {
        LumassError::Config("Could not determine configuration directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            LumassError::Config(format!("Failed to create configuration directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Controller Config ====================

/// File format, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Settings of a controller host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Directory scanned for process plugins; the platform default if unset
    pub plugin_dir: Option<PathBuf>,

    /// Indentation width of written model files
    pub indent: usize,

    /// Log filter directive, overridden by `RUST_LOG`
    pub log_filter: String,

    /// Directory for daily rolling log files; console only if unset
    pub log_dir: Option<PathBuf>,

    /// Capacity of the command channel to the controller thread
    pub command_capacity: usize,

    /// Capacity of the event channel from the controller thread
    pub event_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            indent: DEFAULT_INDENT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_dir: None,
            command_capacity: CMD_CHANNEL_CAPACITY,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ControllerConfig {
    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Plugin directory to scan: the configured one or the platform default
    pub fn effective_plugin_dir(&self) -> Option<PathBuf> {
        self.plugin_dir.clone().or_else(default_plugin_dir)
    }

    /// Load a configuration file (TOML, or JSON for `.json`)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LumassError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;

        match ConfigFormat::of(path) {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| {
                LumassError::Config(format!("Failed to parse config {:?}: {}", path, e))
            }),
            ConfigFormat::Json => serde_json::from_str(&content).map_err(|e| {
                LumassError::Config(format!("Failed to parse config {:?}: {}", path, e))
            }),
        }
    }

    /// Load a configuration file, returning defaults on any error
    ///
    /// A missing file is not worth a warning.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save the configuration (TOML, or JSON for `.json`)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LumassError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = match ConfigFormat::of(path) {
            ConfigFormat::Toml => toml::to_string_pretty(self)
                .map_err(|e| LumassError::Config(format!("Failed to serialize config: {}", e)))?,
            ConfigFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| LumassError::Config(format!("Failed to serialize config: {}", e)))?,
        };

        std::fs::write(path, content).map_err(|e| {
            LumassError::Config(format!("Failed to write config {:?}: {}", path, e))
        })
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.indent, 2);
        assert_eq!(config.command_capacity, 256);
        assert_eq!(config.event_capacity, 10_000);
        assert!(config.plugin_dir.is_none());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumass.toml");
        let config = ControllerConfig {
            plugin_dir: Some(PathBuf::from("/opt/lumass/plugins")),
            indent: 4,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ControllerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumass.json");
        std::fs::write(&path, r#"{ "indent": 8 }"#).unwrap();
        let config = ControllerConfig::load(&path).unwrap();
        assert_eq!(config.indent, 8);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_load_or_default_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "indent = [").unwrap();
        assert_eq!(ControllerConfig::load_or_default(&path), ControllerConfig::default());
        assert_eq!(
            ControllerConfig::load_or_default(dir.path().join("missing.toml")),
            ControllerConfig::default()
        );
    }

    #[test]
    fn test_effective_plugin_dir_prefers_configured() {
        let config = ControllerConfig {
            plugin_dir: Some(PathBuf::from("/plugins")),
            ..Default::default()
        };
        assert_eq!(config.effective_plugin_dir(), Some(PathBuf::from("/plugins")));
    }
}
