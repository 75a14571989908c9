//! Rail controller errors

use crate::pm::PmAction;
use extpower_config::ConfigError;
use extpower_hal::HalError;
use extpower_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtPowerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("GPIO controller not found: {0}")]
    ControllerNotFound(String),

    #[error("Failed to configure ext-power control pin {pin}: {source}")]
    Configure {
        pin: u8,
        #[source]
        source: HalError,
    },

    #[error("Failed to drive ext-power control pin: {0}")]
    Io(#[source] HalError),

    #[error("Invalid stored ext power state: expected 1 byte, found {0}")]
    InvalidSetting(usize),

    #[error("Unsupported power management action: {0}")]
    UnsupportedAction(PmAction),

    #[error("Failed to register settings storage: {0}")]
    Registration(#[source] StorageError),

    #[error("Settings storage error: {0}")]
    Storage(#[source] StorageError),
}

impl ExtPowerError {
    /// Errors that leave the rail (or its persistence) unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExtPowerError::Config(_)
                | ExtPowerError::ControllerNotFound(_)
                | ExtPowerError::Configure { .. }
                | ExtPowerError::Registration(_)
        )
    }
}
