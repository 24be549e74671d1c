//! The service object that owns the timer registry and its driver thread.

use crate::common::{period_usecs, TimerId, Usecs};
use crate::config::TickerConfig;
use crate::driver::{self, DriverAction, DriverHandle, DriverState};
use crate::error::TickerError;
use crate::events::SystemEvent;
use crate::registry::Registry;
use crate::time::{Clock, MonotonicClock};
use crate::timer::Timer;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Everything the registry mutex protects.
pub(crate) struct ServiceState {
    pub registry: Registry,
    pub driver: DriverState,
}

impl ServiceState {
    /// Brings the driver in line with registry occupancy after a removal.
    /// The returned handle must be joined once the lock is released.
    fn retire_driver(&mut self) -> Option<DriverHandle> {
        match self.driver.reconcile(self.registry.active_len()) {
            DriverAction::Join(handle) => Some(handle),
            DriverAction::Spawn | DriverAction::None => None,
        }
    }
}

pub(crate) struct ServiceShared {
    pub config: TickerConfig,
    pub clock: Arc<dyn Clock>,
    pub state: Mutex<ServiceState>,
    /// Wakes the driver early: on shutdown, or when a timer becomes more
    /// urgent than the driver's current sleep.
    pub wake: Condvar,
    pub system_events: broadcast::Sender<SystemEvent>,
}

/// The timer service.
///
/// One service drives any number of timers from a single background thread.
/// The thread only exists while at least one timer is started: the first
/// `start` spawns it and the last `stop` joins it. The service is cheap to
/// clone and every clone refers to the same registry, so it can be handed to
/// whichever part of the application creates timers.
#[derive(Clone)]
pub struct TickerService {
    shared: Arc<ServiceShared>,
}

impl TickerService {
    /// Creates a service measuring time with the system's monotonic clock.
    pub fn new(config: TickerConfig) -> Result<Self, TickerError> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Creates a service measuring time with the given clock.
    pub fn with_clock(config: TickerConfig, clock: Arc<dyn Clock>) -> Result<Self, TickerError> {
        config.validate()?;
        let (system_events, _) = broadcast::channel(64);
        Ok(Self {
            shared: Arc::new(ServiceShared {
                config,
                clock,
                state: Mutex::new(ServiceState {
                    registry: Registry::new(),
                    driver: DriverState::Idle,
                }),
                wake: Condvar::new(),
                system_events,
            }),
        })
    }

    /// Creates a stopped timer ticking once per `period`.
    ///
    /// # Panics
    /// If `period` is shorter than one microsecond.
    pub fn create_timer(&self, period: Duration) -> Timer {
        let usecs = period_usecs(period);
        let shared = self
            .shared
            .state
            .lock()
            .registry
            .insert(usecs, self.shared.config.event_capacity);
        debug!(timer = ?shared.id, "Created timer with a {}us period.", usecs);
        self.send(SystemEvent::TimerCreated { id: shared.id });
        Timer::new(shared, self.clone())
    }

    pub fn config(&self) -> &TickerConfig {
        &self.shared.config
    }

    /// The service clock's current reading, comparable with event timestamps.
    pub fn now(&self) -> Duration {
        self.shared.clock.now()
    }

    /// Whether the driver thread is currently up.
    pub fn driver_running(&self) -> bool {
        self.shared.state.lock().driver.is_driving()
    }

    /// Number of started timers.
    pub fn active_timers(&self) -> usize {
        self.shared.state.lock().registry.active_len()
    }

    /// Number of timers created and not yet destroyed.
    pub fn outstanding_timers(&self) -> usize {
        self.shared.state.lock().registry.len()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.shared.system_events.subscribe()
    }

    /// Stops every running timer and joins the driver.
    ///
    /// Timers that were never destroyed are reported; their handles stay
    /// valid and release them when dropped. Returns the number of
    /// outstanding timers.
    pub fn shutdown(&self) -> usize {
        let (stopped, outstanding, driver) = {
            let mut state = self.shared.state.lock();
            let stopped = state.registry.active_ids();
            for id in &stopped {
                state.registry.stop(*id);
            }
            let outstanding = state.registry.len();
            (stopped, outstanding, state.retire_driver())
        };

        for id in stopped {
            self.send(SystemEvent::TimerStopped { id });
        }
        self.finish_retire(driver);

        if outstanding > 0 {
            warn!(
                "Ticker service shut down with {} timer(s) never destroyed.",
                outstanding
            );
        } else {
            info!("Ticker service shut down.");
        }
        outstanding
    }
}

// Operations behind the `Timer` handle.
impl TickerService {
    pub(crate) fn start_timer(&self, id: TimerId) -> Result<(), TickerError> {
        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            match state.registry.start(id, self.shared.clock.now()) {
                Some(true) => {}
                Some(false) => return Ok(()),
                None => unreachable!("a live timer handle always has a registry entry"),
            }

            if let DriverAction::Spawn = state.driver.reconcile(state.registry.active_len()) {
                match driver::spawn(&self.shared) {
                    Ok(handle) => {
                        state.driver = DriverState::Driving(handle);
                        self.send(SystemEvent::DriverStarted {
                            timestamp: self.shared.clock.now(),
                        });
                    }
                    Err(err) => {
                        state.registry.stop(id);
                        return Err(err);
                    }
                }
            }
        }

        self.shared.wake.notify_all();
        debug!(timer = ?id, "Timer started.");
        self.send(SystemEvent::TimerStarted { id });
        Ok(())
    }

    pub(crate) fn stop_timer(&self, id: TimerId) {
        let driver = {
            let mut state = self.shared.state.lock();
            if state.registry.stop(id) != Some(true) {
                return;
            }
            state.retire_driver()
        };

        debug!(timer = ?id, "Timer stopped.");
        self.send(SystemEvent::TimerStopped { id });
        self.finish_retire(driver);
    }

    pub(crate) fn release_timer(&self, id: TimerId) {
        let (was_running, removed, driver) = {
            let mut state = self.shared.state.lock();
            let was_running = state.registry.stop(id) == Some(true);
            let removed = state.registry.remove(id);
            (was_running, removed, state.retire_driver())
        };

        if was_running {
            self.send(SystemEvent::TimerStopped { id });
        }
        self.finish_retire(driver);

        if removed.is_some() {
            debug!(timer = ?id, "Timer released.");
            self.send(SystemEvent::TimerDestroyed { id });
        }
    }

    pub(crate) fn timer_period(&self, id: TimerId) -> Option<Usecs> {
        self.shared.state.lock().registry.period(id)
    }

    pub(crate) fn set_timer_period(&self, id: TimerId, period: Usecs) {
        let updated = self.shared.state.lock().registry.set_period(id, period);
        if updated {
            self.shared.wake.notify_all();
        }
    }

    pub(crate) fn set_timer_count(&self, id: TimerId, count: i64) {
        self.shared.state.lock().registry.set_count(id, count);
    }

    /// Wakes and joins a driver handed back by `retire_driver`.
    fn finish_retire(&self, driver: Option<DriverHandle>) {
        if let Some(handle) = driver {
            self.shared.wake.notify_all();
            handle.join();
            self.send(SystemEvent::DriverStopped);
        }
    }

    fn send(&self, event: SystemEvent) {
        self.shared.system_events.send(event).ok();
    }

    #[cfg(test)]
    pub(crate) fn wake_driver(&self) {
        self.shared.wake.notify_all();
    }
}
