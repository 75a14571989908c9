//! Rail configuration sections
//!
//! Static description of the rail: which line controls it, how the pin is
//! wired, and how its state is persisted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Rail device identity and timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device label, also the last segment of the settings key
    #[serde(default = "default_label")]
    pub label: String,
    /// Delay after the rail state is resolved at boot, before the device is ready
    #[serde(default)]
    pub init_delay_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
            init_delay_ms: 0,
        }
    }
}

fn default_label() -> String {
    "EXT_POWER".to_string()
}

/// Control line wiring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Label of the GPIO controller owning the line
    #[serde(default = "default_controller")]
    pub controller: String,
    /// Pin offset on that controller
    #[serde(default)]
    pub pin: u8,
    /// Rail is enabled by driving the pin low
    #[serde(default)]
    pub active_low: bool,
    /// Pin is wired open-drain
    #[serde(default)]
    pub open_drain: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            controller: default_controller(),
            pin: 0,
            active_low: false,
            open_drain: false,
        }
    }
}

fn default_controller() -> String {
    "gpio0".to_string()
}

/// Persistence of the rail state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Persist the rail state across restarts
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory of the file-backed settings store
    #[serde(default = "default_settings_path")]
    pub path: PathBuf,
    /// First segment of the settings key
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Quiet period before a state change is written
    #[serde(default = "default_save_debounce")]
    pub save_debounce_ms: u64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_settings_path(),
            namespace: default_namespace(),
            save_debounce_ms: default_save_debounce(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("/var/lib/extpower")
}

fn default_namespace() -> String {
    "ext_power".to_string()
}

fn default_save_debounce() -> u64 {
    60_000
}

/// Display told about power changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Display device name; no display integration when unset
    #[serde(default)]
    pub name: Option<String>,
}

/// Location of the sysfs mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysfsConfig {
    #[serde(default = "default_sysfs_root")]
    pub root: PathBuf,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            root: default_sysfs_root(),
        }
    }
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from("/sys")
}
