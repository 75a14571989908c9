//! Mock implementations for testing without real hardware
//!
//! Mock GPIO controllers record every configuration and write so tests can
//! assert on the exact line traffic, and can be told to reject requests to
//! exercise error paths. Mock displays record every power notification.
//!
//! # Usage
//!
//! ```
//! use extpower_hal::mock::MockHal;
//! use extpower_hal::{GpioRegistry, PinFlags};
//!
//! let hal = MockHal::new().with_controller("gpio0").with_display("DISPLAY");
//!
//! let mut port = hal.bind("gpio0").unwrap();
//! port.configure(13, PinFlags::default()).unwrap();
//! port.set(13, true).unwrap();
//!
//! assert_eq!(hal.gpio("gpio0").unwrap().level(13), Some(true));
//! ```

use crate::{DisplayRegistry, ExtPowerDisplay, GpioPort, GpioRegistry, HalError, PinFlags};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Shared state of a mock GPIO controller
#[derive(Debug, Default)]
pub struct MockGpioState {
    /// Flags of every configured pin
    pub configured: HashMap<u8, PinFlags>,
    /// Current logical level of every configured pin
    pub levels: HashMap<u8, bool>,
    /// Successful writes in order
    pub writes: Vec<(u8, bool)>,
    /// Reject configuration requests
    pub fail_configure: bool,
    /// Reject level writes
    pub fail_writes: bool,
}

/// Mock GPIO controller
///
/// Clones share state: hand one clone to the code under test and keep
/// another for inspection.
#[derive(Debug, Clone)]
pub struct MockGpio {
    label: String,
    state: Arc<RwLock<MockGpioState>>,
}

impl MockGpio {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Arc::new(RwLock::new(MockGpioState::default())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Logical level of a configured pin
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.levels.get(&pin).copied())
    }

    /// Electrical level of a configured pin
    pub fn physical_level(&self, pin: u8) -> Option<bool> {
        let state = self.state.read().ok()?;
        let flags = state.configured.get(&pin)?;
        state.levels.get(&pin).map(|l| flags.physical_level(*l))
    }

    /// Flags a pin was configured with
    pub fn flags(&self, pin: u8) -> Option<PinFlags> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.configured.get(&pin).copied())
    }

    /// All successful writes so far
    pub fn writes(&self) -> Vec<(u8, bool)> {
        self.state
            .read()
            .map(|s| s.writes.clone())
            .unwrap_or_default()
    }

    /// Simulate a driver that refuses to configure pins
    pub fn set_fail_configure(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_configure = fail;
        }
    }

    /// Simulate a driver that refuses level writes
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state.write() {
            state.fail_writes = fail;
        }
    }
}

impl GpioPort for MockGpio {
    fn configure(&mut self, pin: u8, flags: PinFlags) -> Result<(), HalError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| HalError::Rejected("mock state poisoned".into()))?;

        if state.fail_configure {
            return Err(HalError::Rejected(format!(
                "{} refused to configure pin {}",
                self.label, pin
            )));
        }

        state.configured.insert(pin, flags);
        state.levels.insert(pin, false);
        tracing::debug!("[MOCK] {} pin {} configured as output ({:?})", self.label, pin, flags);
        Ok(())
    }

    fn set(&mut self, pin: u8, level: bool) -> Result<(), HalError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| HalError::Rejected("mock state poisoned".into()))?;

        if !state.configured.contains_key(&pin) {
            return Err(HalError::NotConfigured(pin));
        }
        if state.fail_writes {
            return Err(HalError::Rejected(format!(
                "{} refused write to pin {}",
                self.label, pin
            )));
        }

        state.levels.insert(pin, level);
        state.writes.push((pin, level));
        tracing::debug!("[MOCK] {} pin {} set to {}", self.label, pin, level);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MockDisplayState {
    updates: Vec<bool>,
    failing: bool,
    delay: Option<(bool, Duration)>,
}

/// Mock display recording external power notifications
#[derive(Debug, Default)]
pub struct MockDisplay {
    name: String,
    state: RwLock<MockDisplayState>,
}

impl MockDisplay {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(MockDisplayState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every notification received, oldest first
    pub fn updates(&self) -> Vec<bool> {
        self.state
            .read()
            .map(|s| s.updates.clone())
            .unwrap_or_default()
    }

    /// Last power state reported to the display
    pub fn last_update(&self) -> Option<bool> {
        self.state.read().ok().and_then(|s| s.updates.last().copied())
    }

    /// Simulate a display driver that fails notifications
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut state) = self.state.write() {
            state.failing = failing;
        }
    }

    /// Simulate a display that takes `delay` to accept `powered`
    pub fn set_update_delay(&self, powered: bool, delay: Duration) {
        if let Ok(mut state) = self.state.write() {
            state.delay = Some((powered, delay));
        }
    }
}

impl ExtPowerDisplay for MockDisplay {
    fn update_ext_power(&self, powered: bool) -> Result<(), HalError> {
        let delay = self
            .state
            .read()
            .ok()
            .and_then(|s| s.delay)
            .filter(|(slow, _)| *slow == powered);
        if let Some((_, delay)) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| HalError::Rejected("mock state poisoned".into()))?;

        if state.failing {
            return Err(HalError::Rejected(format!("{} is not responding", self.name)));
        }

        state.updates.push(powered);
        tracing::debug!("[MOCK] Display {} ext power {}", self.name, powered);
        Ok(())
    }
}

/// Complete mock HAL: GPIO controllers and displays by name
#[derive(Debug, Default)]
pub struct MockHal {
    controllers: HashMap<String, MockGpio>,
    displays: HashMap<String, Arc<MockDisplay>>,
}

impl MockHal {
    /// Create an empty mock HAL
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a GPIO controller
    pub fn with_controller(mut self, label: &str) -> Self {
        self.controllers
            .insert(label.to_string(), MockGpio::new(label));
        self
    }

    /// Add a display
    pub fn with_display(mut self, name: &str) -> Self {
        self.displays
            .insert(name.to_string(), Arc::new(MockDisplay::new(name)));
        self
    }

    /// Inspection handle for a controller
    pub fn gpio(&self, label: &str) -> Option<MockGpio> {
        self.controllers.get(label).cloned()
    }

    /// Inspection handle for a display
    pub fn display(&self, name: &str) -> Option<Arc<MockDisplay>> {
        self.displays.get(name).cloned()
    }
}

impl GpioRegistry for MockHal {
    fn bind(&self, label: &str) -> Option<Box<dyn GpioPort>> {
        self.controllers
            .get(label)
            .map(|gpio| Box::new(gpio.clone()) as Box<dyn GpioPort>)
    }
}

impl DisplayRegistry for MockHal {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ExtPowerDisplay>> {
        self.displays
            .get(name)
            .map(|display| Arc::clone(display) as Arc<dyn ExtPowerDisplay>)
    }
}
