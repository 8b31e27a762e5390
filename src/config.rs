//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the evc-config.toml file.
//! It provides the device connection settings, polling cadence and schema selection
//! consumed by the update core.
//!
//! ```toml
//! [device]
//! host = "192.168.1.50"
//! password = "12345678"
//! poll_interval_seconds = 60
//! timeout_seconds = 10
//!
//! [schema]
//! preset = "full"
//! ```

use crate::schema::{FieldSpec, SchemaError, SchemaPreset, SchemaTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default location of the config file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "evc-config.toml";

const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or misses required keys
    #[error("invalid config format: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Values parse but make no sense
    #[error("invalid config: {0}")]
    Invalid(String),

    /// Custom schema rows are inconsistent
    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Application configuration loaded from evc-config.toml
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Charger connection settings
    pub device: DeviceConfig,
    /// Telemetry layout selection
    #[serde(default)]
    pub schema: SchemaConfig,
}

/// Charger connection and polling settings
#[derive(Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Host name or address of the charger, optionally with a port
    pub host: String,
    /// Shared secret sent with every request
    pub password: String,
    /// Seconds between scheduled refreshes
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Upper bound for one request, in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

/// Which schema table to decode with.
///
/// When `fields` is present it replaces the preset entirely.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub preset: SchemaPreset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldSpec>>,
}

fn default_poll_interval_seconds() -> u64 {
    DEFAULT_POLL_INTERVAL_SECONDS
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            password: password.into(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("device.host must not be empty".into()));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Invalid(
                "device.password must not be empty".into(),
            ));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "device.poll_interval_seconds must be at least 1".into(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "device.timeout_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// Keeps the password out of logs
impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("password", &"<redacted>")
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl SchemaConfig {
    /// Build the schema table this configuration selects
    pub fn build(&self) -> Result<SchemaTable, SchemaError> {
        match &self.fields {
            Some(fields) => SchemaTable::new(fields.clone()),
            None => Ok(SchemaTable::preset(self.preset)),
        }
    }
}

impl Config {
    /// Load configuration from evc-config.toml in the working directory
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load and validate configuration from the specified path.
    ///
    /// Unlike display-only settings, host and password have no sensible default, so a
    /// missing or broken file is an error rather than a silent fallback.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        tracing::info!(
            path = %path.display(),
            host = %config.device.host,
            "loaded configuration"
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.validate()?;
        self.schema.build()?;
        Ok(())
    }

    /// Save current configuration to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DecodeMode, Unit};
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
        [device]
        host = "192.168.1.50"
        password = "12345678"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.device.host, "192.168.1.50");
        assert_eq!(config.device.password, "12345678");
        assert_eq!(config.device.poll_interval(), Duration::from_secs(60));
        assert_eq!(config.device.timeout(), Duration::from_secs(10));
        assert_eq!(config.schema.preset, SchemaPreset::Full);
        assert_eq!(config.schema.build().unwrap().len(), 16);
    }

    #[test]
    fn test_missing_password_is_rejected() {
        let err = Config::from_toml("[device]\nhost = \"evc.local\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let toml = format!("{MINIMAL}\npoll_interval_seconds = 0\n");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {err:?}");
    }

    #[test]
    fn test_preset_selection() {
        let toml = format!("{MINIMAL}\n[schema]\npreset = \"pcb_only\"\n");
        let config = Config::from_toml(&toml).unwrap();
        let table = config.schema.build().unwrap();
        assert_eq!(table.len(), 15);
        assert!(table.field("plug temperature").is_none());
    }

    #[test]
    fn test_custom_schema_fields() {
        let toml = format!(
            r#"{MINIMAL}
            [[schema.fields]]
            label = "device state"
            raw_index = 0
            decode = {{ mode = "enum_map", default = "Status {{raw}}", cases = [{{ raw = 2, text = "Charging" }}] }}

            [[schema.fields]]
            label = "eq single"
            raw_index = 13
            unit = "kWh"
            semantic_class = "energy"
            decode = {{ mode = "scale_factor", factor = 0.1 }}
            "#
        );
        let config = Config::from_toml(&toml).unwrap();
        let table = config.schema.build().unwrap();

        assert_eq!(table.len(), 2);
        let energy = table.field("eq single").unwrap();
        assert_eq!(energy.unit, Some(Unit::KilowattHour));
        assert_eq!(energy.decode, DecodeMode::ScaleFactor { factor: 0.1 });
    }

    #[test]
    fn test_duplicate_custom_labels_are_rejected() {
        let toml = format!(
            r#"{MINIMAL}
            [[schema.fields]]
            label = "power"
            raw_index = 9
            decode = {{ mode = "scale_factor", factor = 1 }}

            [[schema.fields]]
            label = "power"
            raw_index = 10
            decode = {{ mode = "scale_factor", factor = 1 }}
            "#
        );
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Schema(SchemaError::DuplicateLabel(_))));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = Config::load_from_path("/nonexistent/path/evc-config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::from_toml(MINIMAL).unwrap();

        config.save(temp_file.path()).unwrap();
        let loaded = Config::load_from_path(temp_file.path()).unwrap();

        assert_eq!(loaded.device.host, config.device.host);
        assert_eq!(loaded.device.password, config.device.password);
        assert_eq!(loaded.schema.preset, config.schema.preset);
    }

    #[test]
    fn test_debug_redacts_password() {
        let device = DeviceConfig::new("evc.local", "hunter2");
        let rendered = format!("{device:?}");
        assert!(rendered.contains("evc.local"));
        assert!(!rendered.contains("hunter2"));
    }
}
