//! Configuration management for extpower
//!
//! The rail description normally comes from board data; on Linux hosts it
//! is read from a TOML file. Every field has a default so a partial file is
//! enough.
//!
//! ```toml
//! [device]
//! label = "EXT_POWER"
//! init_delay_ms = 50
//!
//! [control]
//! controller = "gpio0"
//! pin = 13
//! active_low = false
//!
//! [settings]
//! save_debounce_ms = 60000
//!
//! [display]
//! name = "backlight"
//! ```

mod rail_config;

pub use rail_config::{ControlConfig, DeviceConfig, DisplayConfig, SettingsConfig, SysfsConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/extpower";
pub const CONFIG_FILE: &str = "config.toml";
pub const LOCAL_CONFIG_FILE: &str = "local.toml";

/// Complete rail configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtPowerConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub settings: SettingsConfig,

    #[serde(default)]
    pub display: DisplayConfig,

    #[serde(default)]
    pub sysfs: SysfsConfig,
}

impl ExtPowerConfig {
    /// Load and validate configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        // Local overrides first, then the packaged config
        let local = Path::new(CONFIG_DIR).join(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::load(&local);
        }

        let system = Path::new(CONFIG_DIR).join(CONFIG_FILE);
        if system.exists() {
            return Self::load(&system);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.label.is_empty() {
            return Err(ConfigError::Invalid("device.label is empty".into()));
        }
        if self.device.label.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "device.label must not contain '/': {}",
                self.device.label
            )));
        }
        if self.control.controller.is_empty() {
            return Err(ConfigError::Invalid("control.controller is empty".into()));
        }
        if self.settings.namespace.is_empty() || self.settings.namespace.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "settings.namespace must be a single non-empty segment: {:?}",
                self.settings.namespace
            )));
        }
        Ok(())
    }

    /// Key the rail state is persisted under
    pub fn settings_key(&self) -> String {
        format!("{}/state/{}", self.settings.namespace, self.device.label)
    }

    pub fn init_delay(&self) -> Duration {
        Duration::from_millis(self.device.init_delay_ms)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.settings.save_debounce_ms)
    }
}
