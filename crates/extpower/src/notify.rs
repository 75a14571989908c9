//! Display notification of external power changes

use extpower_hal::DisplayRegistry;
use std::sync::Arc;

/// Forwards rail state changes to the configured display, if present
///
/// The display is looked up on every notification, so a display that
/// appears after boot still gets told.
#[derive(Clone, Default)]
pub struct DisplayNotifier {
    target: Option<(String, Arc<dyn DisplayRegistry>)>,
}

impl DisplayNotifier {
    pub fn new(name: Option<&str>, registry: Option<Arc<dyn DisplayRegistry>>) -> Self {
        let target = match (name, registry) {
            (Some(name), Some(registry)) => Some((name.to_string(), registry)),
            _ => None,
        };
        Self { target }
    }

    /// Notifier with no display integration
    pub fn none() -> Self {
        Self::default()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.target.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn notify_power(&self, powered: bool) {
        tracing::debug!("Updating display ext power state: {}", powered);

        let Some((name, registry)) = &self.target else {
            return;
        };

        match registry.lookup(name) {
            Some(display) => {
                if let Err(e) = display.update_ext_power(powered) {
                    tracing::warn!("Failed to notify display {}: {}", name, e);
                }
            }
            None => tracing::debug!("Display {} not present", name),
        }
    }
}
