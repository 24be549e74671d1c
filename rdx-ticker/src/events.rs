//! Defines the event types published by the ticker service and the event
//! source primitive that carries them.
//!
//! An `EventSource` is a lockable, multi-subscriber channel. The publisher
//! takes the source lock, asks whether anybody needs an event, acquires a
//! slot and publishes into it. Subscribing and unsubscribing take the same
//! lock, so a subscriber list never changes in the middle of an emission.

use crate::common::TimerId;
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

/// Fired once per timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    /// The timer that ticked.
    pub source: TimerId,
    /// The timer's tick count after this tick was counted.
    pub count: i64,
    /// Monotonic time of the driver cycle that fired the tick.
    pub timestamp: Duration,
}

/// Events related to the lifecycle of the service, its driver and its timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SystemEvent {
    /// Fired when the registry goes from empty to occupied and the driver
    /// thread has been spawned.
    DriverStarted { timestamp: Duration },
    /// Fired once the driver thread has been joined.
    DriverStopped,
    TimerCreated { id: TimerId },
    TimerStarted { id: TimerId },
    TimerStopped { id: TimerId },
    TimerDestroyed { id: TimerId },
    /// Fired when a capped catch-up discarded part of a timer's tick debt.
    TicksSkipped { id: TimerId, skipped: u64 },
}

/// A subscriber's end of a timer's event stream. Dropping it unsubscribes.
pub type Subscription = broadcast::Receiver<TimerEvent>;

/// A bounded, lockable broadcast channel.
pub struct EventSource<E> {
    sender: broadcast::Sender<E>,
    capacity: usize,
    lock: Mutex<()>,
}

impl<E: Clone> EventSource<E> {
    /// Creates a source holding at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            lock: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        let _guard = self.lock.lock();
        self.sender.subscribe()
    }

    /// Detaches a subscriber while holding the source lock.
    pub fn unsubscribe(&self, receiver: broadcast::Receiver<E>) {
        let _guard = self.lock.lock();
        drop(receiver);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Locks the source for an emission.
    pub fn lock(&self) -> EmitGuard<'_, E> {
        EmitGuard {
            source: self,
            _guard: self.lock.lock(),
        }
    }
}

/// Holds the source lock for the duration of one emission.
pub struct EmitGuard<'a, E> {
    source: &'a EventSource<E>,
    _guard: MutexGuard<'a, ()>,
}

impl<'a, E: Clone> EmitGuard<'a, E> {
    /// Whether at least one subscriber would receive a published event.
    pub fn needs_event(&self) -> bool {
        self.source.sender.receiver_count() > 0
    }

    /// Reserves room for one event, or `None` when the buffer is exhausted
    /// by events some subscriber has not read yet.
    pub fn acquire(&self) -> Option<EventSlot<'_, E>> {
        if self.source.sender.len() >= self.source.capacity {
            return None;
        }
        Some(EventSlot {
            sender: &self.source.sender,
        })
    }
}

/// Room for exactly one event.
pub struct EventSlot<'g, E> {
    sender: &'g broadcast::Sender<E>,
}

impl<'g, E> EventSlot<'g, E> {
    /// Publishes the event, returning how many subscribers it reached.
    pub fn publish(self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
