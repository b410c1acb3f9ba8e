//! Opaque timestamp type shared by every clock in the engine
//!
//! A [`Tick`] is a signed microsecond count used for both stream timestamps
//! (PTS/PCR) and system times. Two sentinels are reserved: [`Tick::INVALID`]
//! marks a missing value and [`Tick::MAX`] marks a "forced update" (render
//! while paused). Callers must check [`Tick::is_valid`] before doing
//! arithmetic on a tick that may carry a sentinel.

use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::time::Instant;

lazy_static::lazy_static! {
    /// Process-wide monotonic origin for `Tick::now()`.
    ///
    /// All system-side ticks derive from this single instant so that every
    /// clock handle in the process shares the same timebase.
    static ref TICK_ORIGIN: Instant = Instant::now();
}

/// Signed microsecond timestamp or duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(i64);

impl Tick {
    /// Sentinel for a missing timestamp
    pub const INVALID: Tick = Tick(i64::MIN);

    /// Sentinel meaning "forced update, do not recalibrate"
    pub const MAX: Tick = Tick(i64::MAX);

    pub const ZERO: Tick = Tick(0);

    pub const fn from_micros(us: i64) -> Self {
        Tick(us)
    }

    pub const fn from_millis(ms: i64) -> Self {
        Tick(ms * 1_000)
    }

    pub const fn from_seconds(s: i64) -> Self {
        Tick(s * 1_000_000)
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub const fn as_millis(self) -> i64 {
        self.0 / 1_000
    }

    /// True if this tick is neither `INVALID` nor `MAX`
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != i64::MIN && self.0 != i64::MAX
    }

    /// Current system time on the shared monotonic timebase
    pub fn now() -> Self {
        let elapsed = TICK_ORIGIN.elapsed();
        Tick(elapsed.as_micros() as i64)
    }

    /// Scale this tick by a floating-point factor, truncating toward zero
    ///
    /// Used for the `coeff / rate` terms of the linear mapping; the operand
    /// must be a valid tick.
    #[inline]
    pub fn scale(self, factor: f64) -> Self {
        debug_assert!(self.is_valid());
        Tick((self.0 as f64 * factor) as i64)
    }

    /// Remaining real-time duration until this deadline, zero if elapsed
    ///
    /// `Tick::MAX` yields an effectively unbounded duration; waiters on it
    /// are released by broadcast only.
    pub fn duration_until(self) -> std::time::Duration {
        let now = Tick::now();
        if self <= now {
            return std::time::Duration::ZERO;
        }
        let remaining = if self == Tick::MAX {
            i64::MAX - now.0
        } else {
            self.0 - now.0
        };
        std::time::Duration::from_micros(remaining as u64)
    }
}

impl Add for Tick {
    type Output = Tick;

    fn add(self, rhs: Tick) -> Tick {
        Tick(self.0 + rhs.0)
    }
}

impl AddAssign for Tick {
    fn add_assign(&mut self, rhs: Tick) {
        self.0 += rhs.0;
    }
}

impl Sub for Tick {
    type Output = Tick;

    fn sub(self, rhs: Tick) -> Tick {
        Tick(self.0 - rhs.0)
    }
}

impl SubAssign for Tick {
    fn sub_assign(&mut self, rhs: Tick) {
        self.0 -= rhs.0;
    }
}

impl Neg for Tick {
    type Output = Tick;

    fn neg(self) -> Tick {
        Tick(-self.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Tick::INVALID {
            write!(f, "invalid")
        } else if *self == Tick::MAX {
            write!(f, "max")
        } else {
            write!(f, "{}us", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_sentinels_are_not_valid() {
        assert!(!Tick::INVALID.is_valid());
        assert!(!Tick::MAX.is_valid());
        assert!(Tick::ZERO.is_valid());
        assert!(Tick::from_millis(-5).is_valid());
    }

    #[test]
    fn test_now_monotonic() {
        let a = Tick::now();
        thread::sleep(Duration::from_millis(2));
        let b = Tick::now();
        assert!(b > a, "Tick::now must be monotonically increasing");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Tick::from_millis(3).as_micros(), 3_000);
        assert_eq!(Tick::from_seconds(2), Tick::from_millis(2_000));
        assert_eq!(Tick::from_micros(1_500).as_millis(), 1);
    }

    #[test]
    fn test_arithmetic() {
        let a = Tick::from_millis(100);
        let b = Tick::from_millis(40);
        assert_eq!(a - b, Tick::from_millis(60));
        assert_eq!(a + b, Tick::from_millis(140));
        assert_eq!(-b, Tick::from_millis(-40));
    }

    #[test]
    fn test_scale_truncates() {
        assert_eq!(Tick::from_micros(1000).scale(0.5), Tick::from_micros(500));
        assert_eq!(Tick::from_micros(3).scale(0.5), Tick::from_micros(1));
    }

    #[test]
    fn test_duration_until_elapsed_deadline() {
        let past = Tick::now() - Tick::from_seconds(1);
        assert_eq!(past.duration_until(), Duration::ZERO);
    }

    #[test]
    fn test_display() {
        assert_eq!(Tick::INVALID.to_string(), "invalid");
        assert_eq!(Tick::MAX.to_string(), "max");
        assert_eq!(Tick::from_micros(7).to_string(), "7us");
    }
}
