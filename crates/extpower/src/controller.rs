//! Power state controller
//!
//! Owns the control line and the commanded rail state. Every change goes
//! line write first; only a successful write updates the state, tells the
//! display and asks for the state to be persisted. One change is in flight
//! at a time.

use crate::error::ExtPowerError;
use crate::init::InitStage;
use crate::notify::DisplayNotifier;
use crate::settings::Persistence;
use extpower_hal::GpioPort;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Runtime state of the rail
pub(crate) struct Rail {
    port: Box<dyn GpioPort>,
    pin: u8,
    pub(crate) status: bool,
    pub(crate) settings_loaded: bool,
}

impl Rail {
    pub(crate) fn new(port: Box<dyn GpioPort>, pin: u8, status: bool) -> Self {
        Self {
            port,
            pin,
            status,
            settings_loaded: false,
        }
    }
}

pub(crate) type SharedRail = Arc<Mutex<Rail>>;

pub(crate) fn lock_rail(rail: &Mutex<Rail>) -> MutexGuard<'_, Rail> {
    rail.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the external power rail
///
/// Created once by [`ExtPower::init`]; callers share it by reference (or
/// behind an `Arc`) for the lifetime of the process.
pub struct ExtPower {
    pub(crate) label: String,
    pub(crate) rail: SharedRail,
    pub(crate) notifier: DisplayNotifier,
    pub(crate) persistence: Persistence,
    pub(crate) stage: InitStage,
}

impl ExtPower {
    /// Turn the rail on
    pub fn enable(&self) -> Result<(), ExtPowerError> {
        self.drive(true)?;
        self.persistence.request_save(&self.rail);
        Ok(())
    }

    /// Turn the rail off
    pub fn disable(&self) -> Result<(), ExtPowerError> {
        self.drive(false)?;
        self.persistence.request_save(&self.rail);
        Ok(())
    }

    /// Current commanded state
    pub fn get(&self) -> bool {
        lock_rail(&self.rail).status
    }

    /// Turn the rail on or off
    pub fn set(&self, on: bool) -> Result<(), ExtPowerError> {
        if on { self.enable() } else { self.disable() }
    }

    /// Whether the boot state came from storage rather than the default
    pub fn settings_loaded(&self) -> bool {
        lock_rail(&self.rail).settings_loaded
    }

    /// Device label, also the last segment of the settings key
    pub fn label(&self) -> &str {
        &self.label
    }

    /// How far bring-up got
    pub fn stage(&self) -> InitStage {
        self.stage
    }

    /// Coordinator saving the rail state
    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// Write the current state to storage now, e.g. before shutdown
    pub fn sync_now(&self) -> Result<(), ExtPowerError> {
        self.persistence.save_now(&self.rail)
    }

    /// Write the line, then update state and tell the display
    ///
    /// All three happen under the rail lock so the display sees changes in
    /// the same order as the line.
    pub(crate) fn drive(&self, on: bool) -> Result<(), ExtPowerError> {
        let mut rail = lock_rail(&self.rail);
        let pin = rail.pin;

        if let Err(e) = rail.port.set(pin, on) {
            tracing::warn!(
                "Failed to {} ext-power control pin: {}",
                if on { "set" } else { "clear" },
                e
            );
            return Err(ExtPowerError::Io(e));
        }
        rail.status = on;

        tracing::info!("{} rail {}", self.label, if on { "enabled" } else { "disabled" });
        self.notifier.notify_power(on);
        Ok(())
    }
}
