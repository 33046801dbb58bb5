use chrono::{DateTime, Duration, Utc};

/// Seconds each question stays open before it is closed automatically.
pub const QUESTION_TIME_LIMIT_SECS: u32 = 45;

/// Remaining seconds at or below which the countdown is shown as urgent.
pub const LOW_TIME_THRESHOLD_SECS: u32 = 10;

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

//
// ─── COUNTDOWN ─────────────────────────────────────────────────────────────────
//

/// Result of feeding one second into a [`Countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time is left on the clock.
    Running { remaining: u32 },
    /// This tick drained the countdown.
    Expired,
    /// The countdown was already at zero; nothing changed.
    Idle,
}

/// Per-question countdown in whole seconds, bounded in `[0, limit]`.
///
/// `Expired` is reported exactly once, on the tick that reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    limit: u32,
    remaining: u32,
}

impl Countdown {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    /// A countdown using [`QUESTION_TIME_LIMIT_SECS`].
    #[must_use]
    pub fn per_question() -> Self {
        Self::new(QUESTION_TIME_LIMIT_SECS)
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_low(&self) -> bool {
        self.remaining <= LOW_TIME_THRESHOLD_SECS
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.remaining == 0 {
            return TickOutcome::Idle;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Running {
                remaining: self.remaining,
            }
        }
    }

    /// Refill to the full limit.
    pub fn reset(&mut self) {
        self.remaining = self.limit;
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::per_question()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_down_by_one_and_expires_once() {
        let mut countdown = Countdown::new(3);
        assert_eq!(countdown.tick(), TickOutcome::Running { remaining: 2 });
        assert_eq!(countdown.tick(), TickOutcome::Running { remaining: 1 });
        assert_eq!(countdown.tick(), TickOutcome::Expired);
        assert_eq!(countdown.remaining(), 0);
        assert_eq!(countdown.tick(), TickOutcome::Idle);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn reset_restores_limit() {
        let mut countdown = Countdown::per_question();
        for _ in 0..40 {
            countdown.tick();
        }
        assert!(countdown.is_low());
        countdown.reset();
        assert_eq!(countdown.remaining(), QUESTION_TIME_LIMIT_SECS);
        assert!(!countdown.is_low());
    }

    #[test]
    fn low_time_threshold_is_inclusive() {
        let mut countdown = Countdown::new(LOW_TIME_THRESHOLD_SECS + 1);
        assert!(!countdown.is_low());
        countdown.tick();
        assert!(countdown.is_low());
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = Clock::fixed(fixed_now());
        clock.advance(Duration::seconds(45));
        assert_eq!(clock.now(), fixed_now() + Duration::seconds(45));
        assert!(matches!(Clock::default(), Clock::Default));
    }
}
