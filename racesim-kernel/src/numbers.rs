//! Numeric primitives: countdown timers, compensated accumulation and the
//! safe cast helpers used by the physics code.

use num_traits::cast::cast;
use serde::{Deserialize, Serialize};

/// Countdown timer advanced once per tick.
///
/// A timer created with `-d` expires after `d` simulated seconds. Timers may
/// also start at zero or above, in which case they report expired
/// immediately; the race uses that to model checks that are already due.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    t: f64,
}

impl Timer {
    #[must_use]
    pub const fn new(initial: f64) -> Self {
        Self { t: initial }
    }

    /// Timer that expires after `duration` seconds.
    #[must_use]
    pub fn countdown(duration: f64) -> Self {
        Self { t: -duration }
    }

    pub fn tick(&mut self, dt: f64) {
        self.t += dt;
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.t >= 0.0
    }

    #[must_use]
    pub const fn value(&self) -> f64 {
        self.t
    }

    pub fn set(&mut self, value: f64) {
        self.t = value;
    }

    /// Seconds left before expiry, zero once expired.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        (-self.t).max(0.0)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Running sum with a Neumaier compensation term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompensatedAccumulator {
    acc: f64,
    err: f64,
}

impl CompensatedAccumulator {
    #[must_use]
    pub const fn new(initial: f64) -> Self {
        Self {
            acc: initial,
            err: 0.0,
        }
    }

    pub fn add(&mut self, n: f64) {
        let t = self.acc + n;
        if self.acc.abs() >= n.abs() {
            self.err += (self.acc - t) + n;
        } else {
            self.err += (n - t) + self.acc;
        }
        self.acc = t;
    }

    /// Compensated total of every addition so far.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.acc + self.err
    }
}

/// Convert usize to f64 while allowing precision loss in a single location.
#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    cast::<usize, f64>(value).unwrap_or(0.0)
}

/// Convert u64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn u64_to_f64(value: u64) -> f64 {
    cast::<u64, f64>(value).unwrap_or(0.0)
}

/// Floor a f64 into a usize index, returning 0 for negative or non-finite values.
#[must_use]
pub fn floor_f64_to_usize(value: f64) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    cast::<f64, usize>(value.floor()).unwrap_or(usize::MAX)
}

/// Round a f64 and clamp it to the i64 range, returning 0 for NaN values.
#[must_use]
pub fn round_f64_to_i64(value: f64) -> i64 {
    if value.is_nan() {
        return 0;
    }
    let min = cast::<i64, f64>(i64::MIN).unwrap_or(f64::MIN);
    let max = cast::<i64, f64>(i64::MAX).unwrap_or(f64::MAX);
    let clamped = value.clamp(min, max).round();
    cast::<f64, i64>(clamped).unwrap_or(0)
}

/// Convert i64 to f64 while allowing precision loss in a single location.
#[must_use]
pub fn i64_to_f64(value: i64) -> f64 {
    cast::<i64, f64>(value).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_counts_up_to_expiry() {
        let mut timer = Timer::countdown(1.0);
        assert!(!timer.is_expired());
        for _ in 0..14 {
            timer.tick(1.0 / 15.0);
        }
        assert!(!timer.is_expired());
        timer.tick(1.0 / 15.0);
        timer.tick(1.0 / 15.0);
        assert!(timer.is_expired());
        assert!(timer.remaining().abs() < f64::EPSILON);
    }

    #[test]
    fn non_negative_timer_is_already_expired() {
        let timer = Timer::new(0.0);
        assert!(timer.is_expired());
        let pending = Timer::new(-2.0);
        assert!(!pending.is_expired());
        assert!((pending.remaining() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn compensated_sum_of_tenths_is_exact() {
        let mut acc = CompensatedAccumulator::new(0.0);
        let mut naive = 0.0_f64;
        for _ in 0..10_000 {
            acc.add(0.1);
            naive += 0.1;
        }
        let compensated_err = (acc.value() - 1000.0).abs();
        let naive_err = (naive - 1000.0).abs();
        assert!(compensated_err <= f64::EPSILON * 1000.0);
        assert!(compensated_err < naive_err);
    }

    #[test]
    fn compensated_sum_survives_large_head() {
        let mut acc = CompensatedAccumulator::new(1.0e16);
        let mut naive = 1.0e16_f64;
        for _ in 0..10_000 {
            acc.add(1.0);
            naive += 1.0;
        }
        assert!((acc.value() - 1.000_000_000_001e16).abs() < 1.0);
        assert!((naive - 1.0e16).abs() < 1.0);
    }

    #[test]
    fn add_and_remove_returns_to_zero() {
        let mut acc = CompensatedAccumulator::default();
        acc.add(0.35);
        acc.add(0.2);
        acc.add(-0.35);
        acc.add(-0.2);
        assert!(acc.value().abs() < 1e-15);
    }

    #[test]
    fn casts_handle_edges() {
        assert_eq!(floor_f64_to_usize(3.9), 3);
        assert_eq!(floor_f64_to_usize(-1.0), 0);
        assert_eq!(floor_f64_to_usize(f64::NAN), 0);
        assert_eq!(round_f64_to_i64(2.5), 3);
        assert_eq!(round_f64_to_i64(f64::NAN), 0);
        assert!((usize_to_f64(12) - 12.0).abs() < f64::EPSILON);
        assert!((u64_to_f64(7) - 7.0).abs() < f64::EPSILON);
        assert!((i64_to_f64(-4) + 4.0).abs() < f64::EPSILON);
    }
}
