//! Contains common, primitive types shared across the ticker crate.
//!
//! Timers are identified by generational keys so that a handle which outlives
//! its timer can never alias a timer created later. Time inside the engine is
//! tracked in signed microseconds, the unit the driver's countdowns use.

use slotmap::new_key_type;
use std::time::Duration;

new_key_type! {
    /// Uniquely and safely identifies a timer owned by a `TickerService`.
    ///
    /// Keys are never reused, so a stale `Timer` handle left over after a
    /// shutdown refers to nothing rather than to somebody else's timer.
    pub struct TimerId;
}

/// Signed microseconds. Countdowns go negative when the driver oversleeps.
pub type Usecs = i64;

/// Converts a period to whole microseconds, saturating at `Usecs::MAX`.
pub fn duration_to_usecs(duration: Duration) -> Usecs {
    Usecs::try_from(duration.as_micros()).unwrap_or(Usecs::MAX)
}

/// Converts microseconds back to a `Duration`. Negative values clamp to zero.
pub fn usecs_to_duration(usecs: Usecs) -> Duration {
    Duration::from_micros(u64::try_from(usecs).unwrap_or(0))
}

/// Converts a timer period, panicking when it is not a positive number of
/// microseconds.
pub(crate) fn period_usecs(period: Duration) -> Usecs {
    let usecs = duration_to_usecs(period);
    assert!(
        usecs > 0,
        "timer period must be at least one microsecond, got {:?}",
        period
    );
    usecs
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Duration::from_millis(10), 10_000; "millis")]
    #[test_case(Duration::from_micros(1), 1; "one_micro")]
    #[test_case(Duration::from_nanos(1_999), 1; "truncates_nanos")]
    fn period_is_converted_to_micros(period: Duration, expected: Usecs) {
        assert_eq!(expected, period_usecs(period));
    }

    #[test]
    #[should_panic(expected = "timer period must be at least one microsecond")]
    fn zero_period_is_rejected() {
        period_usecs(Duration::ZERO);
    }

    #[test]
    #[should_panic(expected = "timer period must be at least one microsecond")]
    fn sub_microsecond_period_is_rejected() {
        period_usecs(Duration::from_nanos(999));
    }

    #[test]
    fn negative_usecs_clamp_to_zero() {
        assert_eq!(Duration::ZERO, usecs_to_duration(-5));
        assert_eq!(Duration::from_micros(7), usecs_to_duration(7));
    }
}
