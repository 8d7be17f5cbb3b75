//! Download speed estimate from completed chunk fetches.
//!
//! Two exponentially weighted averages with different half-lives; the
//! estimate is the lower of the two so a sudden slowdown shows up quickly
//! while a short burst does not inflate it.

use std::time::Duration;

#[derive(Clone, Debug)]
pub(crate) struct ThroughputEstimator {
    fast: Ewma,
    slow: Ewma,
    bytes_sampled: u64,
}

impl ThroughputEstimator {
    const FAST_HALF_LIFE_SECS: f64 = 2.0;
    const SLOW_HALF_LIFE_SECS: f64 = 10.0;
    /// Smaller fetches are dominated by latency and say little about speed.
    const MIN_SAMPLE_BYTES: u64 = 4 * 1024;
    const MIN_DURATION_SECS: f64 = 0.000_5;

    pub(crate) fn new() -> Self {
        Self {
            fast: Ewma::new(Self::FAST_HALF_LIFE_SECS),
            slow: Ewma::new(Self::SLOW_HALF_LIFE_SECS),
            bytes_sampled: 0,
        }
    }

    pub(crate) fn push_sample(&mut self, bytes: u64, elapsed: Duration) {
        if bytes < Self::MIN_SAMPLE_BYTES {
            return;
        }
        let secs = elapsed.as_secs_f64().max(Self::MIN_DURATION_SECS);
        let rate = bytes as f64 / secs;
        self.fast.add_sample(secs, rate);
        self.slow.add_sample(secs, rate);
        self.bytes_sampled = self.bytes_sampled.saturating_add(bytes);
    }

    /// Bytes per second, once anything has been measured.
    pub(crate) fn bytes_per_sec(&self) -> Option<u64> {
        let estimate = self.fast.estimate().min(self.slow.estimate());
        (estimate > 0.0).then(|| estimate.round() as u64)
    }

    /// Time to download `bytes` at the current estimate.
    pub(crate) fn time_for(&self, bytes: u64) -> Option<Duration> {
        let rate = self.bytes_per_sec()?;
        Some(Duration::from_secs_f64(bytes as f64 / rate.max(1) as f64))
    }
}

#[derive(Clone, Debug)]
struct Ewma {
    alpha: f64,
    last: f64,
    total_weight: f64,
}

impl Ewma {
    fn new(half_life_secs: f64) -> Self {
        Self {
            alpha: f64::exp(0.5_f64.ln() / half_life_secs.max(0.001)),
            last: 0.0,
            total_weight: 0.0,
        }
    }

    fn add_sample(&mut self, weight: f64, value: f64) {
        let alpha = self.alpha.powf(weight.max(0.0));
        self.last = value * (1.0 - alpha) + alpha * self.last;
        self.total_weight += weight.max(0.0);
    }

    fn estimate(&self) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        let zero_factor = 1.0 - self.alpha.powf(self.total_weight);
        self.last / zero_factor.max(1e-6)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn no_estimate_without_samples() {
        let estimator = ThroughputEstimator::new();
        assert_eq!(estimator.bytes_per_sec(), None);
        assert_eq!(estimator.time_for(1024), None);
    }

    #[test]
    fn tiny_fetches_are_ignored() {
        let mut estimator = ThroughputEstimator::new();
        estimator.push_sample(512, Duration::from_millis(10));
        assert_eq!(estimator.bytes_per_sec(), None);
    }

    #[rstest]
    #[case(vec![(500_000, 1000)])]
    #[case(vec![(500_000, 1000), (500_000, 1000), (500_000, 1000)])]
    fn steady_rate_is_recovered(#[case] samples: Vec<(u64, u64)>) {
        let mut estimator = ThroughputEstimator::new();
        for (bytes, millis) in samples {
            estimator.push_sample(bytes, Duration::from_millis(millis));
        }

        let rate = estimator.bytes_per_sec().unwrap();
        assert!((490_000..=510_000).contains(&rate), "rate {rate}");
        let eta = estimator.time_for(1_000_000).unwrap();
        assert!((eta.as_secs_f64() - 2.0).abs() < 0.1);
    }

    #[test]
    fn slowdown_pulls_the_estimate_down() {
        let mut estimator = ThroughputEstimator::new();
        for _ in 0..5 {
            estimator.push_sample(1_000_000, Duration::from_millis(500));
        }
        let fast = estimator.bytes_per_sec().unwrap();

        estimator.push_sample(100_000, Duration::from_secs(2));

        assert!(estimator.bytes_per_sec().unwrap() < fast);
    }
}
