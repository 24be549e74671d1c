//! Wall-clock behaviour of the ticker service. These tests sleep for real, so
//! their assertions leave room for scheduling jitter.

use std::thread::sleep;
use std::time::{Duration, Instant};
use ticker::prelude::*;
use tokio::sync::broadcast::error::TryRecvError;

const MS: Duration = Duration::from_millis(1);

fn service() -> TickerService {
    TickerService::new(TickerConfig::default()).unwrap()
}

/// Polls `events` until an event arrives, the stream closes or `timeout`
/// passes.
fn recv_within(events: &mut Subscription, timeout: Duration) -> Result<TimerEvent, TryRecvError> {
    let deadline = Instant::now() + timeout;
    loop {
        match events.try_recv() {
            Err(TryRecvError::Empty) if Instant::now() < deadline => sleep(MS),
            other => return other,
        }
    }
}

#[test]
fn ticks_accumulate_while_running() {
    let service = service();
    let timer = service.create_timer(10 * MS);
    timer.start().unwrap();

    let mut last = 0;
    for _ in 0..15 {
        sleep(10 * MS);
        let count = timer.count();
        assert!(count >= last, "count went backwards: {} -> {}", last, count);
        last = count;
    }
    sleep(30 * MS);

    assert!(timer.count() >= 10, "only {} ticks after 180ms", timer.count());
}

#[test]
fn stopping_freezes_the_count() {
    let service = service();
    let timer = service.create_timer(10 * MS);
    timer.start().unwrap();
    sleep(50 * MS);

    timer.stop();
    let frozen = timer.count();
    sleep(50 * MS);

    assert!(frozen > 0);
    assert_eq!(frozen, timer.count());
    assert!(!timer.is_running());
}

#[test]
fn driver_runs_only_while_a_timer_is_started() {
    let service = service();
    let first = service.create_timer(5 * MS);
    let second = service.create_timer(7 * MS);
    assert!(!service.driver_running());

    first.start().unwrap();
    second.start().unwrap();
    assert!(service.driver_running());
    sleep(20 * MS);

    first.stop();
    assert!(service.driver_running());
    let before = second.count();
    sleep(20 * MS);
    assert!(second.count() > before, "remaining timer stopped ticking");

    second.stop();
    assert!(!service.driver_running());
}

#[test]
fn timers_accumulate_in_proportion_to_their_periods() {
    let service = service();
    let fast = service.create_timer(10 * MS);
    let slow = service.create_timer(25 * MS);
    fast.start().unwrap();
    slow.start().unwrap();

    sleep(200 * MS);
    fast.stop();
    slow.stop();

    let fast_elapsed = fast.count() * 10;
    let slow_elapsed = slow.count() * 25;
    assert!(fast.count() >= 18, "fast timer fired {} times", fast.count());
    assert!(slow.count() >= 7, "slow timer fired {} times", slow.count());
    assert!(
        (fast_elapsed - slow_elapsed).abs() <= 35,
        "fast covered {}ms, slow covered {}ms",
        fast_elapsed,
        slow_elapsed
    );
}

#[test]
fn events_are_numbered_and_stamped_in_order() {
    let service = service();
    let timer = service.create_timer(5 * MS);
    let mut events = timer.subscribe();
    timer.start().unwrap();

    let mut previous: Option<TimerEvent> = None;
    for expected in 1..=10 {
        let event = recv_within(&mut events, 500 * MS).unwrap();
        assert_eq!(expected, event.count);
        assert_eq!(timer.id(), event.source);
        if let Some(previous) = previous {
            assert!(event.timestamp >= previous.timestamp);
        }
        previous = Some(event);
    }
    assert!(previous.unwrap().timestamp <= service.now());
}

#[test]
fn set_count_reseeds_the_event_numbering() {
    let service = service();
    let timer = service.create_timer(5 * MS);
    timer.start().unwrap();
    sleep(20 * MS);

    let mut events = timer.subscribe();
    timer.set_count(1000);
    // A tick may have been queued just before the reseed.
    let event = loop {
        let event = recv_within(&mut events, 500 * MS).unwrap();
        if event.count >= 1000 {
            break event;
        }
    };

    assert_eq!(1001, event.count);
    assert!(timer.count() >= 1001);
}

#[test]
fn speeding_up_a_running_timer_takes_effect() {
    let service = service();
    let timer = service.create_timer(200 * MS);
    timer.start().unwrap();
    sleep(10 * MS);

    timer.set_speed(5 * MS);
    assert_eq!(5 * MS, timer.speed());
    sleep(100 * MS);

    assert!(timer.count() >= 10, "only {} ticks after retuning", timer.count());
}

#[test]
fn destroying_a_running_timer_closes_its_subscriptions() {
    let service = service();
    let timer = service.create_timer(5 * MS);
    let mut events = timer.subscribe();
    timer.start().unwrap();
    recv_within(&mut events, 500 * MS).unwrap();

    timer.destroy();
    assert!(!service.driver_running());
    assert_eq!(0, service.outstanding_timers());

    // Whatever was queued before the destroy is still delivered, then the
    // stream ends.
    let closed = loop {
        match recv_within(&mut events, 500 * MS) {
            Ok(_) => continue,
            Err(err) => break err,
        }
    };
    assert_eq!(TryRecvError::Closed, closed);
}

#[test]
fn unsubscribed_timers_keep_counting() {
    let service = service();
    let timer = service.create_timer(5 * MS);
    let events = timer.subscribe();
    timer.unsubscribe(events);
    assert_eq!(0, timer.subscriber_count());

    timer.start().unwrap();
    sleep(40 * MS);
    assert!(timer.count() >= 4);
}
