//! extpowerd
//!
//! Brings up the external power rail at start, then follows the host:
//! - SIGUSR1: host is suspending, cut the rail
//! - SIGUSR2: host resumed, restore the rail
//! - SIGTERM/SIGINT: flush the rail state to storage and exit
//!
//! Set `EXTPOWER_MOCK=1` to run against the in-memory HAL.

use anyhow::{Context, Result};
use extpower::{Debouncer, ExtPower, Persistence, PmAction, TokioDebouncer};
use extpower_config::ExtPowerConfig;
use extpower_hal::mock::MockHal;
use extpower_hal::{BacklightRegistry, DisplayRegistry, GpioRegistry, SysfsGpio};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

/// Hardware the rail is brought up on
struct Backend {
    gpio: Arc<dyn GpioRegistry + Send + Sync>,
    displays: Arc<dyn DisplayRegistry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();

    setup_logging();

    info!("extpowerd starting...");

    let config = match parse_args(std::env::args().skip(1))? {
        Some(path) => ExtPowerConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => ExtPowerConfig::load_default().context("Failed to load configuration")?,
    };

    let backend = select_backend(&config, std::env::var("EXTPOWER_MOCK").ok().as_deref());

    let debouncer: Arc<dyn Debouncer> =
        Arc::new(TokioDebouncer::current().context("No tokio runtime")?);
    let persistence = Persistence::from_config_or_disabled(&config, debouncer);

    // Bring-up may sleep for the configured settle delay
    let ext_power = tokio::task::spawn_blocking(move || {
        ExtPower::init(
            &config,
            backend.gpio.as_ref(),
            Some(backend.displays),
            persistence,
        )
    })
    .await
    .context("Rail bring-up task failed")?
    .context("Failed to bring up ext power rail")?;

    info!(
        "{} up in {:?}, rail {}",
        ext_power.label(),
        start.elapsed(),
        if ext_power.get() { "on" } else { "off" }
    );

    main_loop(&ext_power).await
}

/// Setup logging to console
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

/// Config file given with `--config`, if any
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<PathBuf>> {
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args.next().context("--config requires a path")?;
                config = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(config)
}

fn mock_requested(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("1" | "true" | "yes"))
}

fn select_backend(config: &ExtPowerConfig, mock: Option<&str>) -> Backend {
    if mock_requested(mock) {
        warn!("Using mock HAL, no hardware will be switched");

        let mut hal = MockHal::new().with_controller(&config.control.controller);
        if let Some(name) = &config.display.name {
            hal = hal.with_display(name);
        }
        let hal = Arc::new(hal);

        return Backend {
            gpio: hal.clone(),
            displays: hal,
        };
    }

    debug!("Using sysfs under {}", config.sysfs.root.display());
    let gpio = SysfsGpio::with_root(&config.sysfs.root);
    let backlights = BacklightRegistry::with_root(&config.sysfs.root);

    for problem in missing_hardware(config, &gpio, &backlights) {
        warn!("{}", problem);
    }

    Backend {
        gpio: Arc::new(gpio),
        displays: Arc::new(backlights),
    }
}

/// Configured controller or display that sysfs does not list
fn missing_hardware(
    config: &ExtPowerConfig,
    gpio: &SysfsGpio,
    backlights: &BacklightRegistry,
) -> Vec<String> {
    let mut problems = Vec::new();

    match gpio.list_chips() {
        Ok(chips) => {
            let controller = &config.control.controller;
            if gpio.bind(controller).is_none() {
                let labels: Vec<_> = chips.into_iter().map(|(label, _, _)| label).collect();
                problems.push(format!(
                    "GPIO controller {} not found, available: [{}]",
                    controller,
                    labels.join(", ")
                ));
            }
        }
        Err(e) => problems.push(format!("Failed to list GPIO controllers: {}", e)),
    }

    if let Some(name) = &config.display.name {
        match backlights.list() {
            Ok(names) if !names.contains(name) => problems.push(format!(
                "Display {} not found, available: [{}]",
                name,
                names.join(", ")
            )),
            Ok(_) => {}
            Err(e) => problems.push(format!("Failed to list backlights: {}", e)),
        }
    }

    problems
}

/// Main loop - map signals onto the rail until asked to stop
async fn main_loop(ext_power: &ExtPower) -> Result<()> {
    let mut suspend =
        signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
    let mut resume =
        signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    loop {
        tokio::select! {
            _ = suspend.recv() => handle_pm_action(ext_power, PmAction::Suspend),
            _ = resume.recv() => handle_pm_action(ext_power, PmAction::Resume),
            _ = terminate.recv() => break,
            _ = interrupt.recv() => break,
        }
    }

    info!("Received shutdown signal");
    if let Err(e) = ext_power.sync_now() {
        error!("Failed to save ext power state: {}", e);
    }

    Ok(())
}

fn handle_pm_action(ext_power: &ExtPower, action: PmAction) {
    match ext_power.pm_action(action) {
        Ok(state) => info!("Power management {}: rail {:?}", action, state),
        Err(e) => warn!("Power management {} failed: {}", action, e),
    }
}
