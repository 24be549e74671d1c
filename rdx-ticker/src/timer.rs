//! The application-facing timer handle and the per-timer state it shares with
//! the driver.

use crate::common::{period_usecs, usecs_to_duration, TimerId};
use crate::engine::TickerService;
use crate::error::TickerError;
use crate::events::{EventSource, Subscription, TimerEvent};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Per-timer state readable without the registry lock.
///
/// `running` and `count` are only written while the registry lock is held,
/// so lock-free readers see values that are at most one driver cycle stale.
pub(crate) struct TimerShared {
    pub id: TimerId,
    running: AtomicBool,
    count: AtomicI64,
    source: EventSource<TimerEvent>,
}

impl TimerShared {
    pub(crate) fn new(id: TimerId, event_capacity: usize) -> Self {
        Self {
            id,
            running: AtomicBool::new(false),
            count: AtomicI64::new(0),
            source: EventSource::new(event_capacity),
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn count(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn set_count(&self, count: i64) {
        self.count.store(count, Ordering::Release);
    }

    /// Counts one tick and, if a subscriber wants it, publishes it.
    ///
    /// The count update and the emission happen under the source lock, so
    /// every event carries the count its own tick produced.
    pub(crate) fn fire(&self, now: Duration) {
        let guard = self.source.lock();
        let count = self.count.fetch_add(1, Ordering::AcqRel).wrapping_add(1);

        if !guard.needs_event() {
            return;
        }
        match guard.acquire() {
            Some(slot) => {
                slot.publish(TimerEvent {
                    source: self.id,
                    count,
                    timestamp: now,
                });
            }
            None => trace!(timer = ?self.id, count, "Event buffer exhausted, tick not delivered."),
        }
    }
}

/// A periodic timer owned by the application.
///
/// Created by [`TickerService::create_timer`]. While started, the service's
/// driver thread advances it and publishes a [`TimerEvent`] per tick to every
/// subscriber. Dropping the handle stops the timer and releases it, closing
/// any outstanding subscriptions.
pub struct Timer {
    shared: Arc<TimerShared>,
    service: TickerService,
}

impl Timer {
    pub(crate) fn new(shared: Arc<TimerShared>, service: TickerService) -> Self {
        Self { shared, service }
    }

    pub fn id(&self) -> TimerId {
        self.shared.id
    }

    /// Starts the timer. Does nothing if it is already running.
    ///
    /// The first timer to start brings up the service's driver thread; if the
    /// thread cannot be spawned the timer stays stopped and the error is
    /// returned.
    pub fn start(&self) -> Result<(), TickerError> {
        if self.is_running() {
            return Ok(());
        }
        self.service.start_timer(self.shared.id)
    }

    /// Stops the timer. Does nothing if it is not running.
    ///
    /// Stopping the last running timer joins the driver thread before
    /// returning.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        self.service.stop_timer(self.shared.id);
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// The current period between ticks.
    pub fn speed(&self) -> Duration {
        self.service
            .timer_period(self.shared.id)
            .map(usecs_to_duration)
            .unwrap_or_default()
    }

    /// Changes the period. A running timer keeps its progress toward the next
    /// tick: the pending countdown moves by the difference between the two
    /// periods instead of restarting.
    ///
    /// # Panics
    /// If `period` is shorter than one microsecond.
    pub fn set_speed(&self, period: Duration) {
        let usecs = period_usecs(period);
        self.service.set_timer_period(self.shared.id, usecs);
    }

    /// The number of ticks fired so far. May trail the driver by one cycle.
    pub fn count(&self) -> i64 {
        self.shared.count()
    }

    /// Overwrites the tick count without touching the timing phase.
    pub fn set_count(&self, count: i64) {
        self.service.set_timer_count(self.shared.id, count);
    }

    /// Subscribes to this timer's tick events.
    pub fn subscribe(&self) -> Subscription {
        self.shared.source.subscribe()
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.shared.source.unsubscribe(subscription);
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.source.subscriber_count()
    }

    /// Stops and releases the timer. Equivalent to dropping the handle.
    pub fn destroy(self) {
        debug!(timer = ?self.shared.id, "Destroying timer.");
        drop(self);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.service.release_timer(self.shared.id);
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.shared.id)
            .field("running", &self.is_running())
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;
    use tokio::sync::broadcast::error::TryRecvError;

    fn shared(capacity: usize) -> TimerShared {
        TimerShared::new(TimerId::from(KeyData::from_ffi(1)), capacity)
    }

    #[test]
    fn fire_counts_ticks_without_subscribers() {
        let timer = shared(4);
        timer.fire(Duration::from_millis(1));
        timer.fire(Duration::from_millis(2));
        assert_eq!(2, timer.count());
    }

    #[test]
    fn fired_events_carry_count_and_timestamp() {
        let timer = shared(4);
        let mut events = timer.source.subscribe();
        timer.set_count(41);

        timer.fire(Duration::from_millis(30));

        let event = events.try_recv().unwrap();
        assert_eq!(42, event.count);
        assert_eq!(Duration::from_millis(30), event.timestamp);
        assert_eq!(timer.id, event.source);
    }

    #[test]
    fn exhausted_buffer_still_counts_the_tick() {
        let timer = shared(1);
        let mut events = timer.source.subscribe();

        timer.fire(Duration::from_millis(1));
        timer.fire(Duration::from_millis(2));

        assert_eq!(2, timer.count());
        assert_eq!(1, events.try_recv().unwrap().count);
        assert_eq!(Err(TryRecvError::Empty), events.try_recv());
    }
}
