//! Debounced deferred work
//!
//! A debouncer holds at most one pending action. Scheduling again before it
//! fires replaces the action and pushes the deadline back, so a burst of
//! requests ends in a single run.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;

/// Work run once the debounce delay expires
pub type DeferredAction = Box<dyn FnOnce() + Send + 'static>;

/// Schedule-or-reschedule of a single deferred action
pub trait Debouncer: Send + Sync {
    /// Run `action` after `delay`, replacing any action still pending
    fn schedule(&self, delay: Duration, action: DeferredAction);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Debouncer backed by a tokio timer task
///
/// Each schedule aborts the previous task and spawns a new one on the
/// runtime. The action runs on the blocking pool, so it may do file I/O.
pub struct TokioDebouncer {
    handle: Handle,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl TokioDebouncer {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            pending: Mutex::new(None),
        }
    }

    /// Use the runtime the caller is running on
    pub fn current() -> Result<Self, TryCurrentError> {
        Ok(Self::new(Handle::try_current()?))
    }

    /// Whether an action is waiting to fire
    pub fn is_pending(&self) -> bool {
        lock(&self.pending)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Debouncer for TokioDebouncer {
    fn schedule(&self, delay: Duration, action: DeferredAction) {
        let mut pending = lock(&self.pending);

        if let Some(previous) = pending.take() {
            previous.abort();
        }

        *pending = Some(self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tokio::task::spawn_blocking(action).await {
                tracing::error!("Deferred action failed: {}", e);
            }
        }));
    }
}

impl Drop for TokioDebouncer {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.pending).take() {
            task.abort();
        }
    }
}

#[derive(Default)]
struct ManualState {
    pending: Option<(Duration, DeferredAction)>,
    scheduled: Vec<Duration>,
}

/// Debouncer fired by hand
///
/// Keeps the pending action until [`ManualDebouncer::fire`] is called.
/// Used for deterministic tests and for hosts that drive their own clock.
#[derive(Default)]
pub struct ManualDebouncer {
    state: Mutex<ManualState>,
}

impl ManualDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the pending action, if any. Returns whether one ran.
    pub fn fire(&self) -> bool {
        // Take the action out first: it may schedule again
        let action = lock(&self.state).pending.take();

        match action {
            Some((_, action)) => {
                action();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    /// Delay of the pending action
    pub fn pending_delay(&self) -> Option<Duration> {
        lock(&self.state).pending.as_ref().map(|(delay, _)| *delay)
    }

    /// Number of schedule calls so far
    pub fn schedule_count(&self) -> usize {
        lock(&self.state).scheduled.len()
    }

    /// Delays of every schedule call, oldest first
    pub fn scheduled(&self) -> Vec<Duration> {
        lock(&self.state).scheduled.clone()
    }
}

impl Debouncer for ManualDebouncer {
    fn schedule(&self, delay: Duration, action: DeferredAction) {
        let mut state = lock(&self.state);
        state.scheduled.push(delay);
        state.pending = Some((delay, action));
    }
}
