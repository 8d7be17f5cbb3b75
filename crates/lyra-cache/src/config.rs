use std::{path::PathBuf, time::Duration};

use derivative::Derivative;
use lyra_net::{Headers, NetOptions};
use tokio_util::sync::CancellationToken;

/// Tuning for one [`StreamingCache`](crate::StreamingCache).
///
/// Window sizes are in chunks. The defaults suit 256 KiB chunks of a
/// compressed audio stream.
#[derive(Clone, Derivative)]
#[derivative(Debug, Default)]
pub struct CacheConfig {
    /// Size of one chunk in bytes.
    #[derivative(Default(value = "256 * 1024"))]
    pub chunk_size: u64,
    /// Chunks fetched ahead of the cursor before playback starts.
    #[derivative(Default(value = "6"))]
    pub lookahead_chunks: usize,
    /// Chunks fetched ahead of the cursor while playing.
    #[derivative(Default(value = "12"))]
    pub playing_lookahead_chunks: usize,
    /// Chunks kept warm behind the cursor.
    #[derivative(Default(value = "2"))]
    pub behind_chunks: usize,
    /// Chunks after a boosted seek target that share its priority.
    #[derivative(Default(value = "6"))]
    pub seek_boost_window: usize,
    /// Ready chunks ahead of the cursor that count as sufficiently buffered.
    #[derivative(Default(value = "3"))]
    pub min_ready_chunks: usize,
    /// Simultaneous range fetches.
    #[derivative(Default(value = "4"))]
    pub max_concurrency: usize,
    /// Of those, how many may serve background fill.
    #[derivative(Default(value = "2"))]
    pub background_concurrency: usize,
    /// Re-plan interval when nothing else wakes the scheduler.
    #[derivative(Default(value = "Duration::from_millis(150)"))]
    pub poll_interval: Duration,
    /// Failed fetches before a chunk is given up on.
    #[derivative(Default(value = "3"))]
    pub max_chunk_attempts: u32,
    /// First chunk retry delay; doubles per attempt.
    #[derivative(Default(value = "Duration::from_millis(300)"))]
    pub retry_base_delay: Duration,
    #[derivative(Default(value = "Duration::from_secs(5)"))]
    pub retry_max_delay: Duration,
    /// Bound for `wait_for_cache_ready` and `ensure_position_async`.
    #[derivative(Default(value = "Duration::from_secs(15)"))]
    pub ready_timeout: Duration,
    /// Bound for a blocking read miss in [`CacheReader`](crate::CacheReader).
    #[derivative(Default(value = "Duration::from_secs(10)"))]
    pub read_timeout: Duration,
    /// Fraction of the resource past which the tail chunks are prefetched.
    #[derivative(Default(value = "0.9"))]
    pub near_end_threshold: f64,
    /// Trailing chunks fetched once the cursor or a seek is near the end.
    #[derivative(Default(value = "3"))]
    pub tail_chunks: usize,
    /// Measured time per chunk above which the playing lookahead doubles.
    #[derivative(Default(value = "Duration::from_secs(1)"))]
    pub slow_chunk_fetch: Duration,
    /// Write fully downloaded resources here and reuse them on open.
    pub cache_dir: Option<PathBuf>,
    /// Evict old chunks beyond this many resident bytes; disables background fill.
    pub max_resident_bytes: Option<u64>,
    /// Extra headers for every range request.
    pub headers: Option<Headers>,
    /// Network options; `body_timeout` bounds each chunk fetch.
    pub net: NetOptions,
    /// Parent token; cancelling it disposes the cache.
    pub cancel: Option<CancellationToken>,
}

impl CacheConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    #[must_use]
    pub fn with_lookahead(mut self, preroll: usize, playing: usize) -> Self {
        self.lookahead_chunks = preroll;
        self.playing_lookahead_chunks = playing;
        self
    }

    #[must_use]
    pub fn with_behind_chunks(mut self, behind: usize) -> Self {
        self.behind_chunks = behind;
        self
    }

    #[must_use]
    pub fn with_seek_boost_window(mut self, chunks: usize) -> Self {
        self.seek_boost_window = chunks;
        self
    }

    #[must_use]
    pub fn with_min_ready_chunks(mut self, chunks: usize) -> Self {
        self.min_ready_chunks = chunks;
        self
    }

    /// Set total and background fetch concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, max: usize, background: usize) -> Self {
        self.max_concurrency = max;
        self.background_concurrency = background;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the chunk retry cap and backoff.
    #[must_use]
    pub fn with_chunk_retries(mut self, attempts: u32, base: Duration, max: Duration) -> Self {
        self.max_chunk_attempts = attempts;
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_tail_prefetch(mut self, threshold: f64, chunks: usize) -> Self {
        self.near_end_threshold = threshold;
        self.tail_chunks = chunks;
        self
    }

    #[must_use]
    pub fn with_slow_chunk_fetch(mut self, threshold: Duration) -> Self {
        self.slow_chunk_fetch = threshold;
        self
    }

    #[must_use]
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_max_resident_bytes(mut self, bytes: Option<u64>) -> Self {
        self.max_resident_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    #[must_use]
    pub fn with_net(mut self, net: NetOptions) -> Self {
        self.net = net;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Delay before retrying a chunk that failed `attempts` times.
    #[must_use]
    pub fn chunk_retry_delay(&self, attempts: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempts.saturating_sub(1));
        self.retry_base_delay
            .saturating_mul(factor)
            .min(self.retry_max_delay)
    }
}
