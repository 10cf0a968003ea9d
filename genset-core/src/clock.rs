//! Monotonic time sources accepted by the sequencer.
//!
//! The sequencer never samples a clock itself. Callers pass an instant into
//! every tick and command, so the same state machine runs against
//! [`std::time::Instant`] on a live console and against [`SimInstant`] in
//! scripted sessions and tests.

use core::fmt::Debug;
use core::ops::{Add, AddAssign};
use core::time::Duration;

/// Trait implemented by monotonic instant types used for deadlines.
pub trait MonotonicInstant: Copy + Ord + Debug + Add<Duration, Output = Self> {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

impl MonotonicInstant for std::time::Instant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        std::time::Instant::saturating_duration_since(self, earlier)
    }
}

/// Simulated instant, in microseconds since the session began.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SimInstant(u64);

impl SimInstant {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Time elapsed between session start and this instant.
    #[must_use]
    pub const fn since_start(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl AddAssign<Duration> for SimInstant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl MonotonicInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_instant_advances_by_duration() {
        let mut now = SimInstant::from_millis(1_500);
        now += Duration::from_millis(250);
        assert_eq!(now, SimInstant::from_micros(1_750_000));
        assert_eq!(now.since_start(), Duration::from_millis(1_750));
    }

    #[test]
    fn duration_since_saturates_when_reversed() {
        let early = SimInstant::from_secs(2);
        let late = SimInstant::from_secs(5);
        assert_eq!(late.saturating_duration_since(early), Duration::from_secs(3));
        assert_eq!(early.saturating_duration_since(late), Duration::ZERO);
    }

    #[test]
    fn addition_saturates_at_the_end_of_time() {
        let end = SimInstant::from_micros(u64::MAX - 1) + Duration::from_secs(10);
        assert_eq!(end.as_micros(), u64::MAX);
    }
}
