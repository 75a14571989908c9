//! Power-management integration
//!
//! Maps host suspend/resume onto the rail: the rail is cut while the host
//! sleeps and restored on wake. Each action is one enable or disable, so
//! persistence goes through the usual debounce.

use crate::controller::ExtPower;
use crate::error::ExtPowerError;
use std::fmt;

/// Host power-management lifecycle action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmAction {
    Resume,
    Suspend,
    TurnOn,
    TurnOff,
}

impl PmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PmAction::Resume => "resume",
            PmAction::Suspend => "suspend",
            PmAction::TurnOn => "turn_on",
            PmAction::TurnOff => "turn_off",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "resume" => Some(PmAction::Resume),
            "suspend" => Some(PmAction::Suspend),
            "turn_on" => Some(PmAction::TurnOn),
            "turn_off" => Some(PmAction::TurnOff),
            _ => None,
        }
    }
}

impl fmt::Display for PmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rail state as seen by power management
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PmState {
    Active,
    Suspended,
}

impl PmState {
    pub fn from_status(status: bool) -> Self {
        if status {
            PmState::Active
        } else {
            PmState::Suspended
        }
    }
}

impl ExtPower {
    /// Handle a power-management action
    pub fn pm_action(&self, action: PmAction) -> Result<PmState, ExtPowerError> {
        tracing::debug!("Power management action: {}", action);

        match action {
            PmAction::Resume => self.enable()?,
            PmAction::Suspend => self.disable()?,
            other => return Err(ExtPowerError::UnsupportedAction(other)),
        }

        Ok(self.pm_state())
    }

    pub fn pm_state(&self) -> PmState {
        PmState::from_status(self.get())
    }
}
