//! The table of timers owned by a service and the set of those that are
//! currently started.
//!
//! Every field in here is guarded by the service's single registry mutex.
//! The registry itself knows nothing about threads: it reports occupancy
//! transitions and lets the engine decide what to do with the driver, and it
//! exposes one wake cycle as [`Registry::advance`], so the timing arithmetic
//! can be exercised without a clock or a thread.

use crate::common::{duration_to_usecs, TimerId, Usecs};
use crate::timer::TimerShared;
use slotmap::SlotMap;
use std::sync::Arc;
use std::time::Duration;

/// The registry-guarded half of a timer.
pub(crate) struct TimerEntry {
    pub shared: Arc<TimerShared>,
    pub period: Usecs,
    pub countdown: Usecs,
}

/// The outcome of one wake cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Cycle {
    /// How long the driver should sleep before the next cycle.
    pub next_interval: Usecs,
    /// Ticks fired across all timers.
    pub fired: u64,
    /// Timers whose catch-up was capped, with the number of ticks discarded.
    pub skipped: Vec<(TimerId, u64)>,
    /// Time charged against the active countdowns.
    pub elapsed: Usecs,
}

#[derive(Default)]
pub(crate) struct Registry {
    timers: SlotMap<TimerId, TimerEntry>,
    active: Vec<TimerId>,
    /// Clock reading of the last cycle, or of the start that occupied an
    /// empty registry.
    last_wake: Duration,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a stopped timer to the table.
    pub(crate) fn insert(&mut self, period: Usecs, event_capacity: usize) -> Arc<TimerShared> {
        let id = self.timers.insert_with_key(|id| TimerEntry {
            shared: Arc::new(TimerShared::new(id, event_capacity)),
            period,
            countdown: 0,
        });
        self.timers[id].shared.clone()
    }

    /// Removes a timer from the table, deactivating it first.
    pub(crate) fn remove(&mut self, id: TimerId) -> Option<Arc<TimerShared>> {
        self.stop(id);
        self.timers.remove(id).map(|entry| entry.shared)
    }

    /// Activates a timer with a full period ahead of it, measured from `now`.
    ///
    /// The next cycle charges everything since the previous wake, so the
    /// time that already passed before the start is credited back up front.
    ///
    /// Returns `Some(true)` if the timer was started, `Some(false)` if it was
    /// already running and `None` if it is not in the table.
    pub(crate) fn start(&mut self, id: TimerId, now: Duration) -> Option<bool> {
        if self.active.is_empty() {
            self.last_wake = now;
        }
        let credit = duration_to_usecs(now.saturating_sub(self.last_wake));
        let entry = self.timers.get_mut(id)?;
        if entry.shared.is_running() {
            return Some(false);
        }
        entry.countdown = entry.period.saturating_add(credit);
        entry.shared.set_running(true);
        self.active.push(id);
        Some(true)
    }

    /// Deactivates a timer. Same return convention as [`Registry::start`].
    pub(crate) fn stop(&mut self, id: TimerId) -> Option<bool> {
        let entry = self.timers.get(id)?;
        if !entry.shared.is_running() {
            return Some(false);
        }
        self.active.retain(|active| *active != id);
        entry.shared.set_running(false);
        Some(true)
    }

    pub(crate) fn period(&self, id: TimerId) -> Option<Usecs> {
        self.timers.get(id).map(|entry| entry.period)
    }

    #[cfg(test)]
    pub(crate) fn countdown(&self, id: TimerId) -> Option<Usecs> {
        self.timers.get(id).map(|entry| entry.countdown)
    }

    /// Changes a timer's period, rebasing a running countdown by the
    /// difference so partial progress toward the next tick is kept.
    pub(crate) fn set_period(&mut self, id: TimerId, period: Usecs) -> bool {
        let Some(entry) = self.timers.get_mut(id) else {
            return false;
        };
        if entry.shared.is_running() {
            entry.countdown = entry.countdown.saturating_add(period - entry.period);
        }
        entry.period = period;
        true
    }

    pub(crate) fn set_count(&mut self, id: TimerId, count: i64) -> bool {
        let Some(entry) = self.timers.get(id) else {
            return false;
        };
        entry.shared.set_count(count);
        true
    }

    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.timers.len()
    }

    pub(crate) fn active_ids(&self) -> Vec<TimerId> {
        self.active.clone()
    }

    /// Runs the wake cycle for a driver that woke at `now`, charging the
    /// time since the previous wake.
    pub(crate) fn tick(&mut self, now: Duration, idle: Usecs, max_catch_up: Option<u32>) -> Cycle {
        let elapsed = duration_to_usecs(now.saturating_sub(self.last_wake));
        self.last_wake = now;
        let mut cycle = self.advance(elapsed, now, idle, max_catch_up);
        cycle.elapsed = elapsed;
        cycle
    }

    /// Runs one wake cycle: charges `elapsed` microseconds against every
    /// active countdown and fires a tick for each period boundary crossed.
    ///
    /// A timer that fell several periods behind fires all of the missed ticks
    /// now, unless `max_catch_up` caps the burst. A capped timer drops the
    /// remaining debt but keeps its phase. The returned interval is the
    /// smallest positive countdown, never more than `idle`.
    pub(crate) fn advance(
        &mut self,
        elapsed: Usecs,
        now: Duration,
        idle: Usecs,
        max_catch_up: Option<u32>,
    ) -> Cycle {
        let mut cycle = Cycle {
            next_interval: idle,
            ..Default::default()
        };

        for id in &self.active {
            let Some(entry) = self.timers.get_mut(*id) else {
                continue;
            };
            entry.countdown = entry.countdown.saturating_sub(elapsed);

            let mut burst: u32 = 0;
            while entry.countdown <= 0 {
                if max_catch_up.is_some_and(|cap| burst >= cap) {
                    let debt = entry.countdown.unsigned_abs() / entry.period.unsigned_abs() + 1;
                    entry.countdown = match entry.countdown.rem_euclid(entry.period) {
                        0 => entry.period,
                        rest => rest,
                    };
                    cycle.skipped.push((*id, debt));
                    break;
                }
                entry.countdown += entry.period;
                entry.shared.fire(now);
                burst += 1;
            }
            cycle.fired += u64::from(burst);

            if entry.countdown > 0 && entry.countdown < cycle.next_interval {
                cycle.next_interval = entry.countdown;
            }
        }

        cycle
    }
}
