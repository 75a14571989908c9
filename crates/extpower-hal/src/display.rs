//! Display notification
//!
//! Displays that sit behind the switched rail need to know when external
//! power goes away. On Linux the panel is blanked through the backlight
//! `bl_power` attribute while the rail is off.

use crate::HalError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// FB_BLANK_UNBLANK
const BL_POWER_ON: &str = "0";
/// FB_BLANK_POWERDOWN
const BL_POWER_OFF: &str = "4";

/// A display that reacts to external power changes
pub trait ExtPowerDisplay: Send + Sync {
    fn update_ext_power(&self, powered: bool) -> Result<(), HalError>;
}

/// Lookup of displays by device name
pub trait DisplayRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ExtPowerDisplay>>;
}

/// Panel backlight controlled via sysfs
#[derive(Debug, Clone)]
pub struct SysfsBacklight {
    name: String,
    path: PathBuf,
}

impl SysfsBacklight {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the panel is currently blanked; unreadable counts as not blanked
    pub fn is_blanked(&self) -> bool {
        fs::read_to_string(self.path.join("bl_power"))
            .map(|s| s.trim() != BL_POWER_ON)
            .unwrap_or(false)
    }

    /// Unblank the panel
    pub fn power_on(&self) -> Result<(), HalError> {
        fs::write(self.path.join("bl_power"), BL_POWER_ON)?;
        tracing::info!("Display {} powered on", self.name);
        Ok(())
    }

    /// Blank the panel
    pub fn power_off(&self) -> Result<(), HalError> {
        fs::write(self.path.join("bl_power"), BL_POWER_OFF)?;
        tracing::info!("Display {} powered off", self.name);
        Ok(())
    }
}

impl ExtPowerDisplay for SysfsBacklight {
    fn update_ext_power(&self, powered: bool) -> Result<(), HalError> {
        if self.is_blanked() != powered {
            tracing::debug!("Display {} already {}", self.name, if powered { "on" } else { "off" });
            return Ok(());
        }

        if powered {
            self.power_on()
        } else {
            self.power_off()
        }
    }
}

/// Backlight devices under `/sys/class/backlight`
#[derive(Debug, Clone)]
pub struct BacklightRegistry {
    class_dir: PathBuf,
}

impl BacklightRegistry {
    pub fn new() -> Self {
        Self::with_root(Path::new("/sys"))
    }

    pub fn with_root(root: &Path) -> Self {
        Self {
            class_dir: root.join("class/backlight"),
        }
    }

    /// Names of all backlight devices with power control
    pub fn list(&self) -> Result<Vec<String>, HalError> {
        let mut names = Vec::new();

        if !self.class_dir.exists() {
            return Ok(names);
        }

        for entry in fs::read_dir(&self.class_dir)? {
            let entry = entry?;
            if entry.path().join("bl_power").exists() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

impl Default for BacklightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayRegistry for BacklightRegistry {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ExtPowerDisplay>> {
        let path = self.class_dir.join(name);
        if !path.join("bl_power").exists() {
            return None;
        }

        Some(Arc::new(SysfsBacklight::new(name, path)))
    }
}
