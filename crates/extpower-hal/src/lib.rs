//! Hardware Abstraction Layer (HAL) for the external power rail
//!
//! The rail is switched by a single GPIO output line. This crate defines the
//! interfaces the rail controller talks to, plus Linux sysfs backends and
//! mock backends for host testing.
//!
//! # Backends
//!
//! - [`SysfsGpio`]: GPIO class interface under `/sys/class/gpio`
//! - [`BacklightRegistry`]: panel backlights under `/sys/class/backlight`
//! - [`mock::MockHal`]: in-memory GPIO controllers and displays
//!
//! # Example
//!
//! ```no_run
//! use extpower_hal::{GpioRegistry, PinFlags, SysfsGpio};
//!
//! fn main() -> Result<(), extpower_hal::HalError> {
//!     let gpio = SysfsGpio::new();
//!     if let Some(mut port) = gpio.bind("gpio0") {
//!         port.configure(13, PinFlags::default())?;
//!         port.set(13, true)?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod display;
pub mod gpio;
pub mod mock;

pub use display::{BacklightRegistry, DisplayRegistry, ExtPowerDisplay, SysfsBacklight};
pub use gpio::{Drive, GpioPort, GpioRegistry, PinFlags, SysfsGpio, SysfsGpioChip};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("Invalid pin {pin} (controller has {ngpio} lines)")]
    InvalidPin { pin: u8, ngpio: u32 },

    #[error("Pin {0} is not configured as an output")]
    NotConfigured(u8),

    #[error("Line unavailable: {0}")]
    LineUnavailable(String),

    #[error("Request rejected by driver: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// HAL Result type
pub type Result<T> = std::result::Result<T, HalError>;
