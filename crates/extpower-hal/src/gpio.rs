//! GPIO control line
//!
//! Drives the rail control pin via the Linux GPIO sysfs class interface.
//! Controllers are looked up by their `label`, the same name the board
//! description uses for the control line.

use crate::HalError;
use std::fs;
use std::path::{Path, PathBuf};

/// Output drive mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Drive {
    #[default]
    PushPull,
    OpenDrain,
}

/// Pin configuration flags
///
/// Levels passed to [`GpioPort::set`] are logical: `true` is the active
/// level, whatever the polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinFlags {
    pub active_low: bool,
    pub drive: Drive,
}

impl PinFlags {
    pub fn new(active_low: bool, drive: Drive) -> Self {
        Self { active_low, drive }
    }

    /// Electrical level for a logical level
    pub fn physical_level(&self, logical: bool) -> bool {
        logical != self.active_low
    }
}

/// A GPIO controller able to drive output pins
pub trait GpioPort: Send {
    /// Configure `pin` as an output, initially inactive
    fn configure(&mut self, pin: u8, flags: PinFlags) -> Result<(), HalError>;

    /// Set the logical level of a configured output pin
    fn set(&mut self, pin: u8, level: bool) -> Result<(), HalError>;
}

/// Lookup of GPIO controllers by label
pub trait GpioRegistry {
    fn bind(&self, label: &str) -> Option<Box<dyn GpioPort>>;
}

/// GPIO controllers exposed through sysfs
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    class_dir: PathBuf,
}

impl SysfsGpio {
    /// Use the live sysfs mount
    pub fn new() -> Self {
        Self::with_root(Path::new("/sys"))
    }

    /// Use an alternate sysfs root (chroots, test fixtures)
    pub fn with_root(root: &Path) -> Self {
        Self {
            class_dir: root.join("class/gpio"),
        }
    }

    /// List `(label, base, ngpio)` for every controller
    pub fn list_chips(&self) -> Result<Vec<(String, u32, u32)>, HalError> {
        let mut chips = Vec::new();

        if !self.class_dir.exists() {
            return Ok(chips);
        }

        for entry in fs::read_dir(&self.class_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("gpiochip") {
                continue;
            }

            let path = entry.path();
            let label = read_attr(&path.join("label")).unwrap_or_else(|| name.clone());
            let base = read_attr(&path.join("base")).and_then(|s| s.parse().ok());
            let ngpio = read_attr(&path.join("ngpio")).and_then(|s| s.parse().ok());

            if let (Some(base), Some(ngpio)) = (base, ngpio) {
                chips.push((label, base, ngpio));
            }
        }

        Ok(chips)
    }

    fn find_chip(&self, label: &str) -> Option<SysfsGpioChip> {
        let entries = fs::read_dir(&self.class_dir).ok()?;

        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with("gpiochip") {
                continue;
            }

            let path = entry.path();
            let chip_label = read_attr(&path.join("label"));
            if chip_label.as_deref() != Some(label) && name != label {
                continue;
            }

            let base = read_attr(&path.join("base"))?.parse().ok()?;
            let ngpio = read_attr(&path.join("ngpio"))?.parse().ok()?;

            tracing::debug!("Found GPIO controller {} at {} (base {})", label, path.display(), base);
            return Some(SysfsGpioChip {
                class_dir: self.class_dir.clone(),
                label: label.to_string(),
                base,
                ngpio,
                configured: Vec::new(),
            });
        }

        None
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl GpioRegistry for SysfsGpio {
    fn bind(&self, label: &str) -> Option<Box<dyn GpioPort>> {
        self.find_chip(label)
            .map(|chip| Box::new(chip) as Box<dyn GpioPort>)
    }
}

/// One sysfs GPIO controller
#[derive(Debug)]
pub struct SysfsGpioChip {
    class_dir: PathBuf,
    label: String,
    base: u32,
    ngpio: u32,
    configured: Vec<u8>,
}

impl SysfsGpioChip {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    fn line_dir(&self, pin: u8) -> PathBuf {
        self.class_dir.join(format!("gpio{}", self.base + u32::from(pin)))
    }

    fn export(&self, pin: u8) -> Result<PathBuf, HalError> {
        let line_dir = self.line_dir(pin);
        if line_dir.exists() {
            return Ok(line_dir);
        }

        let number = self.base + u32::from(pin);
        fs::write(self.class_dir.join("export"), number.to_string())?;

        if !line_dir.exists() {
            return Err(HalError::LineUnavailable(format!(
                "gpio{} did not appear after export",
                number
            )));
        }

        tracing::debug!("Exported gpio{}", number);
        Ok(line_dir)
    }
}

impl GpioPort for SysfsGpioChip {
    fn configure(&mut self, pin: u8, flags: PinFlags) -> Result<(), HalError> {
        if u32::from(pin) >= self.ngpio {
            return Err(HalError::InvalidPin {
                pin,
                ngpio: self.ngpio,
            });
        }

        let line_dir = self.export(pin)?;

        // Direction takes a raw level: start electrically inactive
        let direction = if flags.physical_level(false) {
            "high"
        } else {
            "low"
        };
        fs::write(line_dir.join("direction"), direction)?;
        fs::write(
            line_dir.join("active_low"),
            if flags.active_low { "1" } else { "0" },
        )?;

        if flags.drive == Drive::OpenDrain {
            tracing::debug!(
                "Open-drain drive for {} pin {} is left to the pin controller",
                self.label,
                pin
            );
        }

        if !self.configured.contains(&pin) {
            self.configured.push(pin);
        }

        tracing::info!("Configured {} pin {} as output", self.label, pin);
        Ok(())
    }

    fn set(&mut self, pin: u8, level: bool) -> Result<(), HalError> {
        if !self.configured.contains(&pin) {
            return Err(HalError::NotConfigured(pin));
        }

        fs::write(self.line_dir(pin).join("value"), if level { "1" } else { "0" })?;
        Ok(())
    }
}

fn read_attr(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
