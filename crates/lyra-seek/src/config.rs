use std::time::Duration;

use derivative::Derivative;

/// Timing for [`SeekCoordinator`](crate::SeekCoordinator).
#[derive(Clone, Derivative)]
#[derivative(Debug, Default)]
pub struct SeekConfig {
    /// Quiet period after the last request before it executes.
    #[derivative(Default(value = "Duration::from_millis(50)"))]
    pub debounce: Duration,
    /// Committed jumps at most this far are applied immediately.
    #[derivative(Default(value = "Duration::from_millis(1500)"))]
    pub short_jump_threshold: Duration,
    /// Background prefetch bound after a preview or short jump.
    #[derivative(Default(value = "Duration::from_millis(1500)"))]
    pub short_wait: Duration,
    /// Cache wait before a long jump falls back to deferred buffering.
    #[derivative(Default(value = "Duration::from_secs(12)"))]
    pub long_wait: Duration,
    /// Deferred buffering wait before the seek is abandoned.
    #[derivative(Default(value = "Duration::from_secs(30)"))]
    pub deferred_wait: Duration,
    /// Targets are clamped this far before the end.
    #[derivative(Default(value = "Duration::from_millis(50)"))]
    pub end_margin: Duration,
    #[derivative(Default(value = "Duration::from_millis(10)"))]
    pub fade_in: Duration,
    /// How often a long forward seek checks playback progress.
    #[derivative(Default(value = "Duration::from_millis(100)"))]
    pub progress_poll: Duration,
    /// Playback this close to the target makes the jump moot.
    #[derivative(Default(value = "Duration::from_millis(250)"))]
    pub progress_tolerance: Duration,
    /// Consecutive failures after which each failure logs a warning.
    #[derivative(Default(value = "3"))]
    pub failure_warn_limit: u32,
}

impl SeekConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_short_jump(mut self, threshold: Duration, wait: Duration) -> Self {
        self.short_jump_threshold = threshold;
        self.short_wait = wait;
        self
    }

    /// Waits for the long path: first bounded wait, then deferred buffering.
    #[must_use]
    pub fn with_long_waits(mut self, long: Duration, deferred: Duration) -> Self {
        self.long_wait = long;
        self.deferred_wait = deferred;
        self
    }

    #[must_use]
    pub fn with_end_margin(mut self, margin: Duration) -> Self {
        self.end_margin = margin;
        self
    }

    #[must_use]
    pub fn with_fade_in(mut self, fade_in: Duration) -> Self {
        self.fade_in = fade_in;
        self
    }

    #[must_use]
    pub fn with_progress_monitor(mut self, poll: Duration, tolerance: Duration) -> Self {
        self.progress_poll = poll;
        self.progress_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_failure_warn_limit(mut self, limit: u32) -> Self {
        self.failure_warn_limit = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SeekConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.long_wait, Duration::from_secs(12));
        assert_eq!(config.deferred_wait, Duration::from_secs(30));
        assert_eq!(config.failure_warn_limit, 3);
    }

    #[test]
    fn builders_override() {
        let config = SeekConfig::new()
            .with_debounce(Duration::from_millis(5))
            .with_long_waits(Duration::from_millis(100), Duration::from_millis(200));
        assert_eq!(config.debounce, Duration::from_millis(5));
        assert_eq!(config.long_wait, Duration::from_millis(100));
        assert_eq!(config.deferred_wait, Duration::from_millis(200));
    }
}
