//! Integration tests for the external power rail

use extpower::{
    ExtPower, ExtPowerError, InitStage, ManualDebouncer, Persistence, PmAction, PmState,
    TokioDebouncer,
};
use extpower_config::ExtPowerConfig;
use extpower_hal::mock::{MockDisplay, MockGpio, MockHal};
use extpower_storage::{FileStore, MemoryStore, SettingsStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const KEY: &str = "ext_power/state/EXT_POWER";
const PIN: u8 = 13;

/// Mock board with one controller, one display and an in-memory store
struct RailTestEnvironment {
    hal: Arc<MockHal>,
    store: Arc<MemoryStore>,
    debouncer: Arc<ManualDebouncer>,
    config: ExtPowerConfig,
}

impl RailTestEnvironment {
    fn new() -> Self {
        let mut config = ExtPowerConfig::default();
        config.control.pin = PIN;
        config.display.name = Some("DISPLAY".into());

        Self {
            hal: Arc::new(MockHal::new().with_controller("gpio0").with_display("DISPLAY")),
            store: Arc::new(MemoryStore::new()),
            debouncer: Arc::new(ManualDebouncer::new()),
            config,
        }
    }

    fn with_stored(mut self, value: &[u8]) -> Self {
        self.store = Arc::new(MemoryStore::new().with_value(KEY, value));
        self
    }

    fn persistence(&self) -> Persistence {
        Persistence::new(
            self.store.clone(),
            self.debouncer.clone(),
            self.config.settings_key(),
            self.config.save_debounce(),
        )
    }

    fn init(&self) -> Result<ExtPower, ExtPowerError> {
        ExtPower::init(
            &self.config,
            self.hal.as_ref(),
            Some(self.hal.clone()),
            self.persistence(),
        )
    }

    fn gpio(&self) -> MockGpio {
        self.hal.gpio("gpio0").expect("mock controller")
    }

    fn display(&self) -> Arc<MockDisplay> {
        self.hal.display("DISPLAY").expect("mock display")
    }
}

#[test]
fn test_boot_without_stored_state_defaults_on() {
    let env = RailTestEnvironment::new();
    let ext_power = env.init().unwrap();

    assert!(ext_power.get());
    assert!(!ext_power.settings_loaded());
    assert_eq!(ext_power.stage(), InitStage::Ready);
    assert_eq!(env.gpio().level(PIN), Some(true));
    assert_eq!(env.display().updates(), vec![true]);

    // One immediate save request, nothing debounced
    assert_eq!(env.debouncer.scheduled(), vec![Duration::ZERO]);
    assert!(env.debouncer.fire());
    assert_eq!(env.store.writes(), vec![(KEY.to_string(), vec![1])]);
}

#[test]
fn test_boot_with_stored_off() {
    let env = RailTestEnvironment::new().with_stored(&[0]);
    let ext_power = env.init().unwrap();

    assert!(!ext_power.get());
    assert!(ext_power.settings_loaded());
    assert_eq!(env.gpio().writes(), vec![(PIN, false)]);
    assert_eq!(env.display().updates(), vec![false]);
    assert_eq!(env.debouncer.scheduled(), vec![Duration::from_secs(60)]);
}

#[test]
fn test_boot_with_stored_on() {
    let env = RailTestEnvironment::new().with_stored(&[1]);
    let ext_power = env.init().unwrap();

    assert!(ext_power.get());
    assert!(ext_power.settings_loaded());
    assert_eq!(env.debouncer.scheduled(), vec![Duration::from_secs(60)]);
}

#[test]
fn test_boot_with_malformed_state_defaults_on() {
    let env = RailTestEnvironment::new().with_stored(&[1, 0]);
    let ext_power = env.init().unwrap();

    assert!(ext_power.get());
    assert!(!ext_power.settings_loaded());
    assert_eq!(env.debouncer.scheduled(), vec![Duration::ZERO]);
}

#[test]
fn test_boot_with_unreadable_store_defaults_on() {
    let env = RailTestEnvironment::new().with_stored(&[0]);
    env.store.set_fail_loads(true);

    let ext_power = env.init().unwrap();
    assert!(ext_power.get());
    assert!(!ext_power.settings_loaded());
}

#[test]
fn test_commanded_state_is_observed() {
    let env = RailTestEnvironment::new();
    let ext_power = env.init().unwrap();

    for on in [false, true, true, false, false, true] {
        ext_power.set(on).unwrap();
        assert_eq!(ext_power.get(), on);
        assert_eq!(env.gpio().level(PIN), Some(on));
    }
}

#[test]
fn test_rapid_changes_coalesce_into_one_write() {
    let env = RailTestEnvironment::new();
    let ext_power = env.init().unwrap();
    assert!(env.debouncer.fire());

    ext_power.disable().unwrap();
    ext_power.enable().unwrap();
    ext_power.disable().unwrap();
    ext_power.enable().unwrap();
    ext_power.disable().unwrap();

    assert_eq!(env.debouncer.schedule_count(), 6);
    assert!(env.debouncer.fire());
    assert!(!env.debouncer.fire());

    assert_eq!(
        env.store.writes(),
        vec![(KEY.to_string(), vec![1]), (KEY.to_string(), vec![0])]
    );
}

#[test]
fn test_failed_write_leaves_state_unchanged() {
    let env = RailTestEnvironment::new();
    let ext_power = env.init().unwrap();
    let scheduled = env.debouncer.schedule_count();

    env.gpio().set_fail_writes(true);
    let err = ext_power.disable().unwrap_err();

    assert!(matches!(err, ExtPowerError::Io(_)));
    assert!(!err.is_fatal());
    assert!(ext_power.get());
    assert_eq!(env.display().updates(), vec![true]);
    assert_eq!(env.debouncer.schedule_count(), scheduled);
}

#[test]
fn test_display_failure_does_not_fail_enable() {
    let env = RailTestEnvironment::new().with_stored(&[0]);
    let ext_power = env.init().unwrap();
    env.display().set_failing(true);

    ext_power.enable().unwrap();
    assert!(ext_power.get());
}

#[test]
fn test_missing_display_is_ignored() {
    let mut env = RailTestEnvironment::new();
    env.config.display.name = Some("OLED".into());

    let ext_power = env.init().unwrap();
    ext_power.disable().unwrap();
    assert!(env.display().updates().is_empty());
}

#[test]
fn test_suspend_resume_cycle() {
    let env = RailTestEnvironment::new();
    let ext_power = env.init().unwrap();
    assert!(env.debouncer.fire());

    let mut states = Vec::new();
    for action in [PmAction::Resume, PmAction::Suspend, PmAction::Resume] {
        let state = ext_power.pm_action(action).unwrap();
        states.push((state, ext_power.get()));
    }

    assert_eq!(
        states,
        vec![
            (PmState::Active, true),
            (PmState::Suspended, false),
            (PmState::Active, true)
        ]
    );
    assert_eq!(env.display().updates(), vec![true, true, false, true]);

    // Three requests, one write
    assert!(env.debouncer.fire());
    assert_eq!(env.store.write_count(), 2);
    assert_eq!(env.store.get(KEY), Some(vec![1]));
}

#[test]
fn test_unsupported_pm_action() {
    let env = RailTestEnvironment::new();
    let ext_power = env.init().unwrap();
    let writes = env.gpio().writes();

    for action in [PmAction::TurnOn, PmAction::TurnOff] {
        let err = ext_power.pm_action(action).unwrap_err();
        assert!(matches!(err, ExtPowerError::UnsupportedAction(a) if a == action));
    }

    assert!(ext_power.get());
    assert_eq!(ext_power.pm_state(), PmState::Active);
    assert_eq!(env.gpio().writes(), writes);
}

#[test]
fn test_suspend_with_failing_line() {
    let env = RailTestEnvironment::new();
    let ext_power = env.init().unwrap();
    env.gpio().set_fail_writes(true);

    assert!(matches!(
        ext_power.pm_action(PmAction::Suspend),
        Err(ExtPowerError::Io(_))
    ));
    assert_eq!(ext_power.pm_state(), PmState::Active);
}

#[test]
fn test_disabled_persistence() {
    let env = RailTestEnvironment::new().with_stored(&[0]);
    let ext_power = ExtPower::init(
        &env.config,
        env.hal.as_ref(),
        Some(env.hal.clone()),
        Persistence::disabled(),
    )
    .unwrap();

    assert!(ext_power.get());
    assert!(!ext_power.persistence().is_enabled());

    ext_power.disable().unwrap();
    ext_power.sync_now().unwrap();
    assert_eq!(env.debouncer.schedule_count(), 0);
    assert_eq!(env.store.write_count(), 0);
}

#[test]
fn test_unknown_controller_fails_init() {
    let mut env = RailTestEnvironment::new();
    env.config.control.controller = "gpio9".into();

    let err = env.init().err().unwrap();
    assert!(matches!(err, ExtPowerError::ControllerNotFound(ref label) if label == "gpio9"));
    assert!(err.is_fatal());
    assert_eq!(env.debouncer.schedule_count(), 0);
}

#[test]
fn test_configure_failure_fails_init() {
    let env = RailTestEnvironment::new();
    env.gpio().set_fail_configure(true);

    let err = env.init().err().unwrap();
    assert!(matches!(err, ExtPowerError::Configure { pin: PIN, .. }));
    assert!(env.gpio().writes().is_empty());
}

#[test]
fn test_invalid_config_fails_init() {
    let mut env = RailTestEnvironment::new();
    env.config.device.label = String::new();

    assert!(matches!(env.init(), Err(ExtPowerError::Config(_))));
}

#[test]
fn test_init_delay() {
    let mut env = RailTestEnvironment::new();
    env.config.device.init_delay_ms = 20;

    let start = Instant::now();
    let ext_power = env.init().unwrap();

    assert!(start.elapsed() >= Duration::from_millis(20));
    assert!(ext_power.get());
}

#[test]
fn test_active_low_line() {
    let mut env = RailTestEnvironment::new();
    env.config.control.active_low = true;

    let ext_power = env.init().unwrap();
    let gpio = env.gpio();

    assert!(gpio.flags(PIN).unwrap().active_low);
    assert_eq!(gpio.level(PIN), Some(true));
    assert_eq!(gpio.physical_level(PIN), Some(false));

    ext_power.disable().unwrap();
    assert_eq!(gpio.physical_level(PIN), Some(true));
}

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();
    let env = RailTestEnvironment::new();

    let open = |debouncer: Arc<ManualDebouncer>| {
        let store = FileStore::open(&dir.path().join("settings")).unwrap();
        Persistence::new(
            Arc::new(store),
            debouncer,
            env.config.settings_key(),
            env.config.save_debounce(),
        )
    };

    {
        let debouncer = Arc::new(ManualDebouncer::new());
        let ext_power = ExtPower::init(&env.config, env.hal.as_ref(), None, open(debouncer.clone()))
            .unwrap();
        assert!(!ext_power.settings_loaded());

        ext_power.disable().unwrap();
        assert!(debouncer.fire());
    }

    let debouncer = Arc::new(ManualDebouncer::new());
    let ext_power =
        ExtPower::init(&env.config, env.hal.as_ref(), None, open(debouncer)).unwrap();
    assert!(!ext_power.get());
    assert!(ext_power.settings_loaded());

    let store = FileStore::open(&dir.path().join("settings")).unwrap();
    assert_eq!(store.load(KEY).unwrap(), Some(vec![0]));
}

#[test]
fn test_shared_across_threads() {
    let env = RailTestEnvironment::new();
    let ext_power = Arc::new(env.init().unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let ext_power = Arc::clone(&ext_power);
            std::thread::spawn(move || {
                for n in 0..50 {
                    ext_power.set((n + i) % 2 == 0).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(env.gpio().level(PIN), Some(ext_power.get()));
    assert_eq!(env.display().last_update(), Some(ext_power.get()));
    assert!(env.debouncer.fire());
    assert_eq!(env.store.get(KEY), Some(vec![u8::from(ext_power.get())]));
}

#[test]
fn test_display_follows_rail_under_contention() {
    let env = RailTestEnvironment::new().with_stored(&[0]);
    let ext_power = Arc::new(env.init().unwrap());
    env.display().set_update_delay(true, Duration::from_millis(200));

    let enabler = {
        let ext_power = Arc::clone(&ext_power);
        std::thread::spawn(move || ext_power.enable().unwrap())
    };
    std::thread::sleep(Duration::from_millis(50));
    let disabler = {
        let ext_power = Arc::clone(&ext_power);
        std::thread::spawn(move || ext_power.disable().unwrap())
    };

    enabler.join().unwrap();
    disabler.join().unwrap();

    assert!(!ext_power.get());
    assert_eq!(env.gpio().level(PIN), Some(false));
    assert_eq!(env.display().updates(), vec![false, true, false]);
    assert_eq!(env.display().last_update(), Some(ext_power.get()));
}

#[tokio::test(start_paused = true)]
async fn test_debounced_save_on_runtime() {
    let env = RailTestEnvironment::new();
    let debouncer = Arc::new(TokioDebouncer::current().unwrap());
    let persistence = Persistence::new(
        env.store.clone(),
        debouncer.clone(),
        env.config.settings_key(),
        Duration::from_secs(1),
    );

    let ext_power = ExtPower::init(&env.config, env.hal.as_ref(), None, persistence).unwrap();

    // Default-on save runs without delay
    tokio::time::sleep(Duration::from_millis(10)).await;
    settle(&debouncer).await;
    assert_eq!(env.store.get(KEY), Some(vec![1]));

    ext_power.disable().unwrap();
    ext_power.enable().unwrap();
    ext_power.disable().unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(env.store.write_count(), 1);

    tokio::time::sleep(Duration::from_millis(600)).await;
    settle(&debouncer).await;
    assert_eq!(env.store.write_count(), 2);
    assert_eq!(env.store.get(KEY), Some(vec![0]));
}

/// Wait for a fired save to finish on the blocking pool
async fn settle(debouncer: &TokioDebouncer) {
    while debouncer.is_pending() {
        tokio::task::yield_now().await;
    }
}
