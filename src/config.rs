//! Configuration loading.
//!
//! ```toml
//! log_filter = "info"
//!
//! [controller]
//! mailbox = 64
//! tombstones = 256
//!
//! [experiment]
//! name = "garage-demo"
//! reply_timeout_ms = 2000
//!
//! [experiment.properties]
//! throttle = 0.5
//! ```

use crate::framework::tree::DEFAULT_TOMBSTONE_LIMIT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
    /// Fallback tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            experiment: ExperimentConfig::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl ControlConfig {
    /// Checks values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), String> {
        if self.controller.mailbox == 0 {
            return Err("controller.mailbox must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Capacity of the controller's request mailbox
    #[serde(default = "default_mailbox")]
    pub mailbox: usize,
    /// Released resources that keep their final state for inspection
    #[serde(default = "default_tombstones")]
    pub tombstones: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mailbox: default_mailbox(),
            tombstones: default_tombstones(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_experiment_name")]
    pub name: String,
    /// Default deadline for group replies. None waits indefinitely.
    #[serde(default)]
    pub reply_timeout_ms: Option<u64>,
    /// Initial experiment properties
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: default_experiment_name(),
            reply_timeout_ms: None,
            properties: BTreeMap::new(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_mailbox() -> usize {
    32
}

fn default_tombstones() -> usize {
    DEFAULT_TOMBSTONE_LIMIT
}

fn default_experiment_name() -> String {
    "experiment".to_string()
}

/// Load configuration from file, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<ControlConfig, ConfigError> {
    if !path.exists() {
        info!(path = %path.display(), "Configuration file not found, using defaults");
        return Ok(ControlConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ControlConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate().map_err(|reason| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;
    info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ControlConfig::default());
        assert_eq!(config.controller.mailbox, 32);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[experiment]
name = "garage"
reply_timeout_ms = 1500

[experiment.properties]
throttle = 0.5
label = "run-1"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.controller, ControllerConfig::default());
        assert_eq!(config.experiment.name, "garage");
        assert_eq!(config.experiment.reply_timeout_ms, Some(1500));
        assert_eq!(config.experiment.properties["throttle"], json!(0.5));
        assert_eq!(config.experiment.properties["label"], json!("run-1"));
    }

    #[test]
    fn zero_mailbox_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[controller]\nmailbox = 0").unwrap();
        match load_config(file.path()) {
            Err(ConfigError::Invalid { reason, .. }) => assert!(reason.contains("mailbox")),
            other => panic!("expected an invalid configuration, got {other:?}"),
        }
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[controller\nmailbox = ").unwrap();
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
