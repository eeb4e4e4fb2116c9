//! Per-channel sample averaging.
//!
//! True incremental arithmetic mean, seeded by the first sample of the
//! cycle. (Earlier board firmware used a recursive `(old + new) / 2` rule,
//! which exponentially weights recent samples; that behavior is not load
//! bearing for calibration data and is not replicated.) A cycle with no
//! valid sample leaves the accumulator empty rather than reporting zero.

#[derive(Debug, Clone, Copy, Default)]
pub struct RunningAverage {
    value: f32,
    count: u32,
}

impl RunningAverage {
    pub const fn new() -> Self {
        RunningAverage {
            value: 0.0,
            count: 0,
        }
    }

    /// Folds one sample into the mean.
    pub fn update(&mut self, sample: f32) {
        self.count += 1;
        self.value += (sample - self.value) / self.count as f32;
    }

    /// Mean of the samples seen since the last reset, `None` if there were
    /// none.
    pub fn value(&self) -> Option<f32> {
        (self.count > 0).then_some(self.value)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Empties the accumulator for the next acquisition cycle.
    pub fn reset(&mut self) {
        self.value = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_reports_no_value() {
        assert_eq!(RunningAverage::new().value(), None);
    }

    #[test]
    fn idempotent_under_constant_input() {
        let mut avg = RunningAverage::new();
        for _ in 0..10 {
            avg.update(21.375);
        }
        // (x - avg) is exactly zero each round, so the mean is bit-exact.
        assert_eq!(avg.value(), Some(21.375));
    }

    #[test]
    fn averages_a_mixed_stream() {
        let mut avg = RunningAverage::new();
        for s in [10.0, 20.0, 30.0] {
            avg.update(s);
        }
        assert!((avg.value().unwrap() - 20.0).abs() < 1e-5);
        assert_eq!(avg.count(), 3);
    }

    #[test]
    fn reset_clears_between_cycles() {
        let mut avg = RunningAverage::new();
        avg.update(50.0);
        avg.reset();
        assert_eq!(avg.value(), None);
        avg.update(1.0);
        assert_eq!(avg.value(), Some(1.0));
    }
}
