//! Rail bring-up
//!
//! Bring-up runs once, in order:
//! 1. Bind the control line and configure it as an output
//! 2. Resolve the boot state from storage, or fall back to on
//! 3. Wait out the configured settle delay

use crate::controller::{ExtPower, Rail, lock_rail};
use crate::error::ExtPowerError;
use crate::notify::DisplayNotifier;
use crate::settings::Persistence;
use extpower_config::{ControlConfig, ExtPowerConfig};
use extpower_hal::{DisplayRegistry, Drive, GpioRegistry, PinFlags};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Bring-up stages, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitStage {
    Unconfigured,
    LineConfigured,
    SettingsResolved,
    Ready,
}

impl InitStage {
    pub fn name(&self) -> &'static str {
        match self {
            InitStage::Unconfigured => "unconfigured",
            InitStage::LineConfigured => "line-configured",
            InitStage::SettingsResolved => "settings-resolved",
            InitStage::Ready => "ready",
        }
    }
}

/// Output flags for the control line as wired
pub fn pin_flags(control: &ControlConfig) -> PinFlags {
    let drive = if control.open_drain {
        Drive::OpenDrain
    } else {
        Drive::PushPull
    };
    PinFlags::new(control.active_low, drive)
}

fn log_stage_complete(stage: InitStage, start: Instant) {
    tracing::info!("Stage {} reached in {:?}", stage.name(), start.elapsed());
}

impl ExtPower {
    /// Bring up the rail described by `config`
    ///
    /// Fails if the control line cannot be bound or configured. Problems with
    /// stored state are logged and end in the default-on fallback. Blocks for
    /// `device.init_delay_ms` before returning.
    pub fn init(
        config: &ExtPowerConfig,
        gpio: &dyn GpioRegistry,
        displays: Option<Arc<dyn DisplayRegistry>>,
        persistence: Persistence,
    ) -> Result<ExtPower, ExtPowerError> {
        let start = Instant::now();
        config.validate()?;

        let control = &config.control;
        let mut port = gpio.bind(&control.controller).ok_or_else(|| {
            tracing::error!("Failed to get ext-power control device {}", control.controller);
            ExtPowerError::ControllerNotFound(control.controller.clone())
        })?;

        port.configure(control.pin, pin_flags(control))
            .map_err(|source| {
                tracing::error!("Failed to configure ext-power control pin {}", control.pin);
                ExtPowerError::Configure {
                    pin: control.pin,
                    source,
                }
            })?;

        let mut ext_power = ExtPower {
            label: config.device.label.clone(),
            rail: Arc::new(Mutex::new(Rail::new(port, control.pin, false))),
            notifier: DisplayNotifier::new(config.display.name.as_deref(), displays),
            persistence,
            stage: InitStage::LineConfigured,
        };
        log_stage_complete(ext_power.stage, start);

        ext_power.resolve_boot_state();
        ext_power.stage = InitStage::SettingsResolved;
        log_stage_complete(ext_power.stage, start);

        let delay = config.init_delay();
        if !delay.is_zero() {
            tracing::debug!("Waiting {:?} for the rail to settle", delay);
            std::thread::sleep(delay);
        }

        ext_power.stage = InitStage::Ready;
        log_stage_complete(ext_power.stage, start);
        Ok(ext_power)
    }

    fn resolve_boot_state(&self) {
        match self.persistence.load() {
            Ok(Some(on)) => {
                lock_rail(&self.rail).settings_loaded = true;
                tracing::info!("Restoring stored ext power state: {}", on);
                if let Err(e) = self.set(on) {
                    tracing::warn!("Failed to restore ext power state: {}", e);
                }
            }
            Ok(None) => self.apply_default_on(),
            Err(e) => {
                tracing::warn!("{}, ignoring stored value", e);
                self.apply_default_on();
            }
        }
    }

    /// Turn on with a single immediate save instead of a debounced one
    fn apply_default_on(&self) {
        tracing::info!("No stored ext power state, defaulting to on");

        match self.drive(true) {
            Ok(()) => self.persistence.request_save_now(&self.rail),
            Err(e) => tracing::warn!("Failed to apply default ext power state: {}", e),
        }
    }
}
