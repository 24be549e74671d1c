//! The background thread that drives every started timer.
//!
//! The driver's existence follows registry occupancy and nothing else:
//! [`DriverState::reconcile`] is the only place that decides to bring it up
//! or tear it down, based on how many timers are active.

use crate::common::usecs_to_duration;
use crate::engine::ServiceShared;
use crate::error::TickerError;
use crate::events::SystemEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, trace, warn};

/// A running driver thread and its private stop flag.
pub(crate) struct DriverHandle {
    thread: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl DriverHandle {
    /// Asks the thread to exit after its current wait. Must be called with the
    /// registry lock held so the driver cannot miss it between cycles.
    pub(crate) fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn join(self) {
        let name = self.thread.thread().name().unwrap_or("driver").to_string();
        if self.thread.join().is_err() {
            error!("Timer driver thread '{}' panicked.", name);
        }
    }
}

/// What the engine must do after a registry change.
pub(crate) enum DriverAction {
    None,
    Spawn,
    Join(DriverHandle),
}

/// The two states the driver can be in.
#[derive(Default)]
pub(crate) enum DriverState {
    #[default]
    Idle,
    Driving(DriverHandle),
}

impl DriverState {
    pub(crate) fn is_driving(&self) -> bool {
        matches!(self, DriverState::Driving(_))
    }

    /// Compares the state with the number of active timers. An occupied
    /// registry without a driver asks for a spawn. An empty registry with a
    /// driver hands the driver back, already signalled to stop, and returns
    /// to `Idle`.
    pub(crate) fn reconcile(&mut self, active_timers: usize) -> DriverAction {
        match (active_timers, &*self) {
            (0, DriverState::Driving(_)) => match std::mem::take(self) {
                DriverState::Driving(handle) => {
                    handle.signal_stop();
                    DriverAction::Join(handle)
                }
                DriverState::Idle => DriverAction::None,
            },
            (n, DriverState::Idle) if n > 0 => DriverAction::Spawn,
            _ => DriverAction::None,
        }
    }
}

/// Spawns the driver thread for `shared`.
pub(crate) fn spawn(shared: &Arc<ServiceShared>) -> Result<DriverHandle, TickerError> {
    let stop = Arc::new(AtomicBool::new(false));
    let thread = thread::Builder::new()
        .name(shared.config.thread_name.clone())
        .spawn({
            let shared = shared.clone();
            let stop = stop.clone();
            move || drive(shared, stop)
        })
        .map_err(TickerError::DriverSpawn)?;
    Ok(DriverHandle { thread, stop })
}

/// The driver loop.
///
/// Sleeps on the service condvar, which releases the registry lock for the
/// duration of the sleep, then lets the registry charge the measured elapsed
/// time (not the requested sleep) against every active timer and sleeps again
/// for as long as the most urgent timer allows.
fn drive(shared: Arc<ServiceShared>, stop: Arc<AtomicBool>) {
    let idle = shared.config.idle_interval_usecs;
    let mut sleep = shared.config.idle_interval();
    let mut state = shared.state.lock();
    info!("Timer driver started.");

    while !stop.load(Ordering::Acquire) {
        shared.wake.wait_for(&mut state, sleep);
        if stop.load(Ordering::Acquire) {
            break;
        }

        let now = shared.clock.now();
        let cycle = state.registry.tick(now, idle, shared.config.max_catch_up);
        trace!(
            "Driver cycle: {}us elapsed, {} ticks fired, sleeping {}us.",
            cycle.elapsed,
            cycle.fired,
            cycle.next_interval
        );
        for (id, skipped) in cycle.skipped {
            warn!(timer = ?id, skipped, "Timer fell behind, dropping missed ticks.");
            shared
                .system_events
                .send(SystemEvent::TicksSkipped { id, skipped })
                .ok();
        }
        sleep = usecs_to_duration(cycle.next_interval);
    }

    info!("Timer driver stopped.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parked_handle() -> DriverHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = thread::spawn({
            let stop = stop.clone();
            move || {
                while !stop.load(Ordering::Acquire) {
                    thread::yield_now();
                }
            }
        });
        DriverHandle { thread, stop }
    }

    #[test]
    fn idle_driver_spawns_once_occupied() {
        let mut state = DriverState::Idle;
        assert!(matches!(state.reconcile(0), DriverAction::None));
        assert!(matches!(state.reconcile(1), DriverAction::Spawn));
        assert!(!state.is_driving());
    }

    #[test]
    fn driving_driver_is_kept_while_occupied() {
        let mut state = DriverState::Driving(parked_handle());
        assert!(matches!(state.reconcile(2), DriverAction::None));
        assert!(state.is_driving());

        match state.reconcile(0) {
            DriverAction::Join(handle) => handle.join(),
            _ => panic!("Expected the driver to be handed back for joining."),
        }
    }

    #[test]
    fn vacated_registry_returns_a_signalled_driver() {
        let mut state = DriverState::Driving(parked_handle());

        let action = state.reconcile(0);

        assert!(!state.is_driving());
        match action {
            DriverAction::Join(handle) => {
                assert!(handle.stop.load(Ordering::Acquire));
                handle.join();
            }
            _ => panic!("Expected the driver to be handed back for joining."),
        }
    }
}
