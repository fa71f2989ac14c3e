//! Running estimate of how long the next trial will take.

use std::time::Duration;

/// Tracks the wall-clock durations of trials completed by this worker in
/// its current run. Owned by one process, never persisted; a restarted
/// worker starts estimating from scratch.
#[derive(Debug, Default)]
pub struct DurationEstimator {
    samples: Vec<f64>,
}

impl DurationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, duration: Duration) {
        self.samples.push(duration.as_secs_f64());
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Projected duration of the next trial: `mean + 2 * stddev` over the
    /// recorded samples, a deliberately conservative upper bound that
    /// biases toward stopping early rather than being killed mid-trial.
    ///
    /// With fewer than 2 samples there is nothing to project from, so the
    /// whole remaining budget is returned, deferring any cutoff decision.
    /// The stddev term is 0 until a third sample exists; population
    /// standard deviation thereafter.
    pub fn estimate(&self, remaining_budget: Duration) -> Duration {
        if self.samples.len() < 2 {
            return remaining_budget;
        }

        let n = self.samples.len() as f64;
        let mean = self.samples.iter().sum::<f64>() / n;
        let sigma = if self.samples.len() >= 3 {
            let variance = self
                .samples
                .iter()
                .map(|s| (s - mean).powi(2))
                .sum::<f64>()
                / n;
            variance.sqrt()
        } else {
            0.0
        };

        Duration::from_secs_f64(mean + 2.0 * sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUDGET: Duration = Duration::from_secs(3600);

    fn secs(d: Duration) -> f64 {
        d.as_secs_f64()
    }

    #[test]
    fn no_samples_returns_remaining_budget() {
        let est = DurationEstimator::new();
        assert_eq!(est.estimate(BUDGET), BUDGET);
    }

    #[test]
    fn one_sample_still_returns_remaining_budget() {
        let mut est = DurationEstimator::new();
        est.record(Duration::from_secs(100));
        let remaining = Duration::from_secs(3500);
        assert_eq!(est.estimate(remaining), remaining);
    }

    #[test]
    fn two_samples_is_mean_with_zero_sigma() {
        let mut est = DurationEstimator::new();
        est.record(Duration::from_secs(100));
        est.record(Duration::from_secs(120));
        assert!((secs(est.estimate(BUDGET)) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn three_samples_uses_population_stddev() {
        let mut est = DurationEstimator::new();
        est.record(Duration::from_secs(100));
        est.record(Duration::from_secs(120));
        est.record(Duration::from_secs(110));

        // mean 110, population variance 200/3
        let expected = 110.0 + 2.0 * (200.0f64 / 3.0).sqrt();
        assert!((secs(est.estimate(BUDGET)) - expected).abs() < 1e-9);
    }

    #[test]
    fn identical_samples_estimate_their_value() {
        let mut est = DurationEstimator::new();
        for _ in 0..5 {
            est.record(Duration::from_secs(60));
        }
        assert!((secs(est.estimate(BUDGET)) - 60.0).abs() < 1e-9);
    }
}
