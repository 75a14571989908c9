//! External power rail control
//!
//! Switches a power rail through one GPIO output, remembers the last
//! commanded state across restarts and cuts the rail while the host is
//! suspended.
//!
//! # Architecture
//!
//! ```text
//! enable/disable/pm_action
//!        |
//!   [ExtPower] --line write--> GpioPort
//!        |--notify-----------> DisplayNotifier --> ExtPowerDisplay
//!        '--request_save-----> Persistence --debounce--> SettingsStore
//! ```
//!
//! # Example
//!
//! ```
//! use extpower::{ExtPower, Persistence};
//! use extpower_config::ExtPowerConfig;
//! use extpower_hal::mock::MockHal;
//!
//! let hal = MockHal::new().with_controller("gpio0");
//! let config = ExtPowerConfig::default();
//!
//! let ext_power = ExtPower::init(&config, &hal, None, Persistence::disabled()).unwrap();
//! assert!(ext_power.get());
//!
//! ext_power.disable().unwrap();
//! assert!(!ext_power.get());
//! ```

mod controller;
mod debounce;
mod error;
mod init;
mod notify;
mod pm;
mod settings;

pub use controller::ExtPower;
pub use debounce::{DeferredAction, Debouncer, ManualDebouncer, TokioDebouncer};
pub use error::ExtPowerError;
pub use init::{InitStage, pin_flags};
pub use notify::DisplayNotifier;
pub use pm::{PmAction, PmState};
pub use settings::Persistence;

/// Result type for rail operations
pub type Result<T> = std::result::Result<T, ExtPowerError>;
