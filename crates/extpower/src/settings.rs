//! Persistence of the rail state
//!
//! State changes are not written immediately. Each change (re)arms a
//! debounce timer; when it fires the state current at that moment is
//! written as a single byte, so rapid toggling costs one flash write.

use crate::controller::{Rail, SharedRail, lock_rail};
use crate::debounce::{Debouncer, DeferredAction};
use crate::error::ExtPowerError;
use extpower_config::ExtPowerConfig;
use extpower_storage::{FileStore, SettingsStore};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

struct Backend {
    store: Arc<dyn SettingsStore>,
    scheduler: Arc<dyn Debouncer>,
    key: String,
    debounce: Duration,
}

/// Debounced save and boot-time load of the rail state
///
/// A disabled coordinator (no settings support) turns every operation into
/// a no-op.
pub struct Persistence {
    backend: Option<Backend>,
}

impl Persistence {
    pub fn new(
        store: Arc<dyn SettingsStore>,
        scheduler: Arc<dyn Debouncer>,
        key: impl Into<String>,
        debounce: Duration,
    ) -> Self {
        Self {
            backend: Some(Backend {
                store,
                scheduler,
                key: key.into(),
                debounce,
            }),
        }
    }

    /// Coordinator without settings support
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    /// Register the file-backed store described by `config`
    pub fn from_config(
        config: &ExtPowerConfig,
        scheduler: Arc<dyn Debouncer>,
    ) -> Result<Self, ExtPowerError> {
        if !config.settings.enabled {
            tracing::info!("Settings support disabled, ext power state will not persist");
            return Ok(Self::disabled());
        }

        let store = FileStore::open(&config.settings.path).map_err(ExtPowerError::Registration)?;

        Ok(Self::new(
            Arc::new(store),
            scheduler,
            config.settings_key(),
            config.save_debounce(),
        ))
    }

    /// Like [`Persistence::from_config`], degrading to no persistence
    pub fn from_config_or_disabled(config: &ExtPowerConfig, scheduler: Arc<dyn Debouncer>) -> Self {
        Self::from_config(config, scheduler).unwrap_or_else(|e| {
            tracing::error!("{}; ext power state will not survive a restart", e);
            Self::disabled()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn key(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.key.as_str())
    }

    /// Save the rail state once the debounce interval passes quietly
    pub(crate) fn request_save(&self, rail: &SharedRail) {
        if let Some(backend) = &self.backend {
            backend.schedule(backend.debounce, rail);
        }
    }

    /// Save the rail state as soon as the scheduler runs
    pub(crate) fn request_save_now(&self, rail: &SharedRail) {
        if let Some(backend) = &self.backend {
            backend.schedule(Duration::ZERO, rail);
        }
    }

    /// Write the rail state synchronously, bypassing the debounce
    pub(crate) fn save_now(&self, rail: &SharedRail) -> Result<(), ExtPowerError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let status = lock_rail(rail).status;
        backend
            .store
            .save(&backend.key, &[u8::from(status)])
            .map_err(ExtPowerError::Storage)
    }

    /// Previously saved state, `None` if nothing usable was stored
    ///
    /// An unreadable store counts as empty. A value of the wrong size is a
    /// validation error.
    pub fn load(&self) -> Result<Option<bool>, ExtPowerError> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };

        let bytes = match backend.store.load(&backend.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!("No stored value for {}", backend.key);
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", backend.key, e);
                return Ok(None);
            }
        };

        match bytes.as_slice() {
            [value] => Ok(Some(*value != 0)),
            other => Err(ExtPowerError::InvalidSetting(other.len())),
        }
    }
}

impl Backend {
    fn schedule(&self, delay: Duration, rail: &SharedRail) {
        let action = save_action(Arc::clone(&self.store), self.key.clone(), Arc::downgrade(rail));
        self.scheduler.schedule(delay, action);
    }
}

/// Deferred write of whatever the state is when the timer fires
fn save_action(store: Arc<dyn SettingsStore>, key: String, rail: Weak<Mutex<Rail>>) -> DeferredAction {
    Box::new(move || {
        let Some(rail) = rail.upgrade() else {
            return;
        };

        let status = lock_rail(&rail).status;
        match store.save(&key, &[u8::from(status)]) {
            Ok(()) => tracing::debug!("Saved ext power state {} to {}", status, key),
            Err(e) => tracing::error!("Failed to save ext power state to {}: {}", key, e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::ManualDebouncer;
    use extpower_hal::mock::MockGpio;
    use extpower_storage::MemoryStore;

    const KEY: &str = "ext_power/state/EXT_POWER";

    fn rail(status: bool) -> SharedRail {
        Arc::new(Mutex::new(Rail::new(Box::new(MockGpio::new("gpio0")), 0, status)))
    }

    fn persistence(store: &Arc<MemoryStore>, debouncer: &Arc<ManualDebouncer>) -> Persistence {
        Persistence::new(
            store.clone(),
            debouncer.clone(),
            KEY,
            Duration::from_millis(500),
        )
    }

    #[test]
    fn test_load_values() {
        let debouncer = Arc::new(ManualDebouncer::new());

        let store = Arc::new(MemoryStore::new().with_value(KEY, &[0]));
        assert_eq!(persistence(&store, &debouncer).load().unwrap(), Some(false));

        let store = Arc::new(MemoryStore::new().with_value(KEY, &[1]));
        assert_eq!(persistence(&store, &debouncer).load().unwrap(), Some(true));

        let store = Arc::new(MemoryStore::new());
        assert_eq!(persistence(&store, &debouncer).load().unwrap(), None);
    }

    #[test]
    fn test_load_wrong_size() {
        let debouncer = Arc::new(ManualDebouncer::new());
        let store = Arc::new(MemoryStore::new().with_value(KEY, &[1, 0]));

        let err = persistence(&store, &debouncer).load().unwrap_err();
        assert!(matches!(err, ExtPowerError::InvalidSetting(2)));

        let store = Arc::new(MemoryStore::new().with_value(KEY, &[]));
        let err = persistence(&store, &debouncer).load().unwrap_err();
        assert!(matches!(err, ExtPowerError::InvalidSetting(0)));
    }

    #[test]
    fn test_load_failure_counts_as_absent() {
        let debouncer = Arc::new(ManualDebouncer::new());
        let store = Arc::new(MemoryStore::new().with_value(KEY, &[0]));
        store.set_fail_loads(true);

        assert_eq!(persistence(&store, &debouncer).load().unwrap(), None);
    }

    #[test]
    fn test_save_reads_state_at_fire_time() {
        let debouncer = Arc::new(ManualDebouncer::new());
        let store = Arc::new(MemoryStore::new());
        let persistence = persistence(&store, &debouncer);
        let rail = rail(true);

        persistence.request_save(&rail);
        lock_rail(&rail).status = false;

        assert_eq!(debouncer.pending_delay(), Some(Duration::from_millis(500)));
        assert!(debouncer.fire());
        assert_eq!(store.writes(), vec![(KEY.to_string(), vec![0])]);
    }

    #[test]
    fn test_save_now_request() {
        let debouncer = Arc::new(ManualDebouncer::new());
        let store = Arc::new(MemoryStore::new());
        let persistence = persistence(&store, &debouncer);
        let rail = rail(true);

        persistence.request_save_now(&rail);
        assert_eq!(debouncer.pending_delay(), Some(Duration::ZERO));

        persistence.save_now(&rail).unwrap();
        assert_eq!(store.get(KEY), Some(vec![1]));
    }

    #[test]
    fn test_dropped_rail_skips_save() {
        let debouncer = Arc::new(ManualDebouncer::new());
        let store = Arc::new(MemoryStore::new());
        let persistence = persistence(&store, &debouncer);

        persistence.request_save(&rail(true));
        assert!(debouncer.fire());
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_save_failure_is_logged_not_retried() {
        let debouncer = Arc::new(ManualDebouncer::new());
        let store = Arc::new(MemoryStore::new());
        store.set_fail_saves(true);
        let persistence = persistence(&store, &debouncer);
        let rail = rail(true);

        persistence.request_save(&rail);
        assert!(debouncer.fire());
        assert!(!debouncer.is_pending());
        assert_eq!(store.write_count(), 0);

        assert!(matches!(
            persistence.save_now(&rail),
            Err(ExtPowerError::Storage(_))
        ));
    }

    #[test]
    fn test_disabled_is_noop() {
        let persistence = Persistence::disabled();
        let rail = rail(true);

        assert!(!persistence.is_enabled());
        assert!(persistence.key().is_none());
        assert_eq!(persistence.load().unwrap(), None);
        persistence.request_save(&rail);
        persistence.request_save_now(&rail);
        persistence.save_now(&rail).unwrap();
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let debouncer: Arc<dyn Debouncer> = Arc::new(ManualDebouncer::new());

        let mut config = ExtPowerConfig::default();
        config.settings.path = dir.path().join("settings");
        let persistence = Persistence::from_config(&config, debouncer.clone()).unwrap();
        assert!(persistence.is_enabled());
        assert_eq!(persistence.key(), Some("ext_power/state/EXT_POWER"));

        config.settings.enabled = false;
        let persistence = Persistence::from_config(&config, debouncer).unwrap();
        assert!(!persistence.is_enabled());
    }

    #[test]
    fn test_registration_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let debouncer: Arc<dyn Debouncer> = Arc::new(ManualDebouncer::new());

        let mut config = ExtPowerConfig::default();
        config.settings.path = blocker.join("settings");

        let err = Persistence::from_config(&config, debouncer.clone()).err().unwrap();
        assert!(matches!(err, ExtPowerError::Registration(_)));
        assert!(err.is_fatal());

        assert!(!Persistence::from_config_or_disabled(&config, debouncer).is_enabled());
    }
}
