//! Bounded moving average for drift-coefficient smoothing
//!
//! Smooths the instantaneous system/stream speed ratio into a stable
//! coefficient. Once `count` reaches `range` the update degenerates into an
//! exponential moving average with weight `1/range` for new samples, which
//! makes the estimate lag slightly but resist single-sample noise.

/// Incremental weighted average over at most `range` samples
#[derive(Debug, Clone)]
pub struct Average {
    value: f64,
    count: u32,
    range: u32,
}

impl Average {
    pub fn new(range: u32) -> Self {
        debug_assert!(range > 0);
        Self {
            value: 0.0,
            count: 0,
            range,
        }
    }

    /// Discard all accumulated samples
    pub fn reset(&mut self) {
        self.value = 0.0;
        self.count = 0;
    }

    /// Seed the average as if `range` samples of `value` had been observed
    ///
    /// Avoids the warm-up ramp when the nominal value (coefficient 1.0) is
    /// already known.
    pub fn reset_and_fill(&mut self, value: f64) {
        self.value = value;
        self.count = self.range;
    }

    /// Fold one sample into the average
    ///
    /// The accumulated value weighs `min(count, range - 1)`, the new sample
    /// weighs 1; `count` saturates at `range`.
    pub fn update(&mut self, value: f64) {
        let (average_weight, divider) = if self.count < self.range {
            self.count += 1;
            ((self.count - 1) as f64, self.count as f64)
        } else {
            ((self.range - 1) as f64, self.range as f64)
        };
        self.value = (self.value * average_weight + value) / divider;
    }

    pub fn get(&self) -> f64 {
        self.value
    }
}
