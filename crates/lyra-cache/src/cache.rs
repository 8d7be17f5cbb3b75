use std::{future::Future, ops::Range, sync::Arc, time::Duration};

use lyra_events::{BufferingState, CacheEvent, Event, EventBus};
use lyra_net::{Net, RangeFetcher};
use lyra_storage::{CacheDir, ChunkLayout, ChunkState, ChunkStore, WaitOutcome};
use tokio::{runtime::Handle, sync::broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::CacheConfig,
    error::{CacheError, CacheResult},
    reader::CacheReader,
    resource::Resource,
    scheduler::Scheduler,
};

/// Snapshot of how well the cache is keeping up with playback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CacheHealth {
    pub state: BufferingState,
    /// Consecutive Ready chunks starting at the cursor, capped at `required`.
    pub ready_ahead: usize,
    /// Ready chunks needed at the cursor to count as buffered.
    pub required: usize,
    pub fill_fraction: f64,
    /// Measured download rate in bytes per second.
    pub bytes_per_sec: Option<u64>,
}

impl CacheHealth {
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.ready_ahead < self.required
    }
}

struct CacheInner {
    resource: Resource,
    scheduler: Arc<Scheduler>,
    runtime: Handle,
    cancel: CancellationToken,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Progressive cache for one remote resource.
///
/// Cloning is cheap; all clones share one chunk table and one download
/// loop. The loop stops when the last clone (or [`CacheReader`]) drops or
/// [`dispose`](Self::dispose) is called.
#[derive(Clone)]
pub struct StreamingCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for StreamingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingCache")
            .field("resource", &self.inner.resource.id)
            .field("store", &self.inner.scheduler.store)
            .finish_non_exhaustive()
    }
}

impl StreamingCache {
    /// Probe the resource, build the chunk table and start downloading.
    ///
    /// # Errors
    ///
    /// [`CacheError::ResourceUnavailable`] when the size cannot be learned,
    /// [`CacheError::InvalidSize`] when the resource is empty.
    pub async fn initialize(
        resource: Resource,
        config: CacheConfig,
        net: Arc<dyn Net>,
        bus: EventBus,
    ) -> CacheResult<Self> {
        let mut fetcher = RangeFetcher::new(net, resource.url.clone())
            .with_body_timeout(config.net.body_timeout);
        if let Some(headers) = config.headers.clone() {
            fetcher = fetcher.with_headers(headers);
        }

        let total_size = match resource.total_size.filter(|&size| size > 0) {
            Some(size) => size,
            None => {
                fetcher
                    .probe()
                    .await
                    .map_err(|source| CacheError::ResourceUnavailable {
                        id: resource.id.clone(),
                        source,
                    })?
                    .total_size
            }
        };
        let layout = ChunkLayout::new(config.chunk_size, total_size).map_err(|source| {
            CacheError::InvalidSize {
                id: resource.id.clone(),
                source,
            }
        })?;

        let store = ChunkStore::new(layout, config.max_chunk_attempts);
        let persist = config.cache_dir.clone().map(CacheDir::new);
        if let Some(dir) = persist.clone() {
            Self::load_persisted(dir, &resource.id, &store).await;
        }

        let cancel = config
            .cancel
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let fully_cached = store.is_fully_cached();
        let scheduler = Arc::new(Scheduler::new(
            resource.id.clone(),
            store,
            fetcher,
            config,
            bus,
            persist,
            cancel.clone(),
        ));
        if fully_cached {
            scheduler.mark_completed();
            scheduler
                .bus()
                .publish(CacheEvent::FullyCached { total_bytes: total_size });
        }
        tokio::spawn(Arc::clone(&scheduler).run());

        info!(
            resource = %resource.id,
            total_size,
            chunks = layout.num_chunks(),
            "streaming cache initialized"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                resource,
                scheduler,
                runtime: Handle::current(),
                cancel,
            }),
        })
    }

    async fn load_persisted(dir: CacheDir, id: &str, store: &ChunkStore) {
        let total = store.layout().total_size();
        let key = id.to_owned();
        match tokio::task::spawn_blocking(move || dir.load(&key, total)).await {
            Ok(Ok(Some(data))) => {
                let injected = store.inject(0, &data);
                info!(resource = %id, chunks = injected, "loaded cached copy from disk");
            }
            Ok(Ok(None)) => {}
            Ok(Err(error)) => warn!(resource = %id, %error, "failed to read cached copy"),
            Err(error) => warn!(resource = %id, %error, "cache load task failed"),
        }
    }

    // ---- shape ----------------------------------------------------------

    #[must_use]
    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.scheduler.config
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.layout().total_size()
    }

    #[must_use]
    pub fn layout(&self) -> ChunkLayout {
        self.inner.scheduler.store.layout()
    }

    #[must_use]
    pub fn chunk_state(&self, index: usize) -> ChunkState {
        self.inner.scheduler.store.state(index)
    }

    // ---- playback steering ----------------------------------------------

    /// Move the playback cursor. Cheap; safe to call at high frequency.
    pub fn update_playback_position(&self, byte_offset: u64) {
        self.inner.scheduler.set_cursor(byte_offset);
    }

    #[must_use]
    pub fn playback_position(&self) -> u64 {
        self.inner.scheduler.cursor()
    }

    /// Widen the lookahead to the playing window.
    pub fn set_playing_state(&self) {
        self.inner.scheduler.set_playing(true);
    }

    pub fn set_paused_state(&self) {
        self.inner.scheduler.set_playing(false);
    }

    // ---- readiness ------------------------------------------------------

    /// Whether the chunk holding `byte_offset` is Ready. Non-blocking.
    #[must_use]
    pub fn ready(&self, byte_offset: u64) -> bool {
        self.inner.scheduler.store.ready(byte_offset)
    }

    /// Whether `ahead_count` chunks from the one holding `byte_offset` are
    /// all Ready. The window is clipped at the end of the resource.
    #[must_use]
    pub fn are_chunks_ready(&self, byte_offset: u64, ahead_count: usize) -> bool {
        self.inner
            .scheduler
            .store
            .chunks_ready(byte_offset, ahead_count)
    }

    /// Wait until enough data is cached at `byte_offset` to start playback.
    ///
    /// With `exact` only the chunk holding the offset is awaited; otherwise
    /// the configured minimum ready window is. Returns false on timeout,
    /// cancellation or a chunk that became unavailable.
    pub async fn wait_for_cache_ready(
        &self,
        byte_offset: u64,
        exact: bool,
        cancel: &CancellationToken,
    ) -> bool {
        let scheduler = &self.inner.scheduler;
        let layout = self.layout();
        let Some(first) = layout.index_of(byte_offset) else {
            return false;
        };
        let count = if exact {
            1
        } else {
            scheduler
                .config
                .min_ready_chunks
                .min(layout.num_chunks() - first)
                .max(1)
        };
        let Some(range) = chunk_span(layout, first..first + count) else {
            return false;
        };

        let _window = scheduler.add_window(first..first + count);
        let outcome = scheduler
            .wait_range(range, scheduler.config.ready_timeout, cancel)
            .await;
        if outcome != WaitOutcome::Ready {
            debug!(byte_offset, exact, ?outcome, "cache not ready");
        }
        outcome == WaitOutcome::Ready
    }

    /// Wait at most `timeout` for the chunk holding `byte_offset`.
    pub async fn wait_for_position_ready(
        &self,
        byte_offset: u64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let scheduler = &self.inner.scheduler;
        let layout = self.layout();
        let Some(index) = layout.index_of(byte_offset) else {
            return false;
        };
        let Some(range) = layout.range_of(index) else {
            return false;
        };

        let _window = scheduler.add_window(index..index + 1);
        let outcome = scheduler.wait_range(range, timeout, cancel).await;
        if outcome != WaitOutcome::Ready {
            debug!(byte_offset, ?timeout, ?outcome, "position not ready");
        }
        outcome == WaitOutcome::Ready
    }

    // ---- seek assistance ------------------------------------------------

    /// Put the chunk holding `byte_offset` and the chunks after it ahead of
    /// everything else until `cancel` fires or the boost is replaced.
    pub fn request_seek_boost(&self, byte_offset: u64, cancel: CancellationToken) {
        let scheduler = Arc::clone(&self.inner.scheduler);
        let boost = scheduler.set_target(byte_offset);
        self.inner.runtime.spawn(async move {
            tokio::select! {
                biased;
                () = boost.released.cancelled() => {}
                () = cancel.cancelled() => {
                    scheduler.clear_target(Some(boost.generation));
                }
            }
        });
    }

    /// Drop any active seek boost; normal lookahead ordering resumes.
    pub fn cancel_seek_boost(&self) {
        self.inner.scheduler.clear_target(None);
    }

    #[must_use]
    pub fn has_seek_boost(&self) -> bool {
        self.inner.scheduler.has_boost()
    }

    /// Prioritize `ahead_count` chunks from `byte_offset` and resolve true
    /// once they are all Ready. With `allow_range_rescue` the first missing
    /// chunk is fetched immediately instead of waiting its turn.
    ///
    /// The returned future owns everything it needs and may be spawned.
    pub fn prefetch_around(
        &self,
        byte_offset: u64,
        ahead_count: usize,
        cancel: CancellationToken,
        allow_range_rescue: bool,
    ) -> impl Future<Output = bool> + Send + 'static {
        let scheduler = Arc::clone(&self.inner.scheduler);
        async move {
            scheduler
                .prefetch(byte_offset, ahead_count, cancel, allow_range_rescue)
                .await
                == WaitOutcome::Ready
        }
    }

    /// Boost the target, wait for its chunk, then drop the boost if it is
    /// still the one installed here.
    pub async fn ensure_position_async(
        &self,
        byte_offset: u64,
        cancel: &CancellationToken,
        allow_range_rescue: bool,
    ) -> bool {
        let scheduler = Arc::clone(&self.inner.scheduler);
        let _boost = BoostGuard {
            generation: scheduler.set_target(byte_offset).generation,
            scheduler: Arc::clone(&scheduler),
        };
        scheduler
            .prefetch(byte_offset, 1, cancel.clone(), allow_range_rescue)
            .await
            == WaitOutcome::Ready
    }

    // ---- health ---------------------------------------------------------

    #[must_use]
    pub fn health(&self) -> CacheHealth {
        let (state, ready_ahead, required) = self.inner.scheduler.evaluate_health();
        CacheHealth {
            state,
            ready_ahead,
            required,
            fill_fraction: self.fill_fraction(),
            bytes_per_sec: self.inner.scheduler.bytes_per_sec(),
        }
    }

    /// How long `bytes` take to download at the measured rate. `None` until
    /// a fetch has completed.
    #[must_use]
    pub fn estimate_download_time(&self, bytes: u64) -> Option<Duration> {
        self.inner.scheduler.time_for(bytes)
    }

    #[must_use]
    pub fn buffering_state(&self) -> BufferingState {
        self.inner.scheduler.buffering()
    }

    #[must_use]
    pub fn cached_bytes(&self) -> u64 {
        self.inner.scheduler.store.cached_bytes()
    }

    #[must_use]
    pub fn fill_fraction(&self) -> f64 {
        self.inner.scheduler.store.fill_fraction()
    }

    #[must_use]
    pub fn is_fully_cached(&self) -> bool {
        self.inner.scheduler.store.is_fully_cached()
    }

    // ---- access ---------------------------------------------------------

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.scheduler.bus().subscribe()
    }

    /// Blocking reader for decoder threads.
    #[must_use]
    pub fn reader(&self) -> CacheReader {
        CacheReader::new(self.clone())
    }

    /// Stop downloading and fail all pending waits with cancellation.
    pub fn dispose(&self) {
        if !self.inner.cancel.is_cancelled() {
            debug!(resource = %self.inner.resource.id, "disposing streaming cache");
            self.inner.cancel.cancel();
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Read into `buf` at `offset`, blocking the calling thread until the
    /// bytes are cached. Must not be called from an async context.
    pub(crate) fn read_blocking(&self, offset: u64, buf: &mut [u8]) -> CacheResult<usize> {
        let store = &self.inner.scheduler.store;
        let total = store.layout().total_size();
        if offset >= total || buf.is_empty() {
            return Ok(0);
        }
        let len = buf.len().min(usize::try_from(total - offset).unwrap_or(usize::MAX));
        let buf = &mut buf[..len];

        if store.is_fully_cached() {
            return Ok(store.read_cached(offset, buf));
        }

        let range = offset..offset + len as u64;
        // A chunk can be evicted between the wait and the copy; try once more.
        for _ in 0..2 {
            if !store.is_range_ready(&range) {
                self.demand(range.clone())?;
            }
            let read = store.read_at(offset, buf);
            if read > 0 {
                return Ok(read);
            }
        }
        Err(CacheError::WaitTimedOut)
    }

    fn demand(&self, range: Range<u64>) -> CacheResult<()> {
        let scheduler = &self.inner.scheduler;
        let chunks = self.layout().chunks_covering(&range);
        let wait_cancel = self.inner.cancel.child_token();
        let _stop = wait_cancel.clone().drop_guard();

        debug!(offset = range.start, len = range.end - range.start, "read miss, waiting");
        self.inner.runtime.spawn(Arc::clone(scheduler).prefetch(
            range.start,
            chunks.len(),
            wait_cancel.clone(),
            true,
        ));

        match scheduler
            .store
            .wait_ready_blocking(range, scheduler.config.read_timeout, &wait_cancel)
        {
            WaitOutcome::Ready => Ok(()),
            WaitOutcome::Unavailable { index } => Err(CacheError::ChunkUnavailable { index }),
            WaitOutcome::TimedOut => Err(CacheError::WaitTimedOut),
            WaitOutcome::Cancelled => Err(CacheError::Cancelled),
        }
    }
}

fn chunk_span(layout: ChunkLayout, chunks: Range<usize>) -> Option<Range<u64>> {
    let first = layout.range_of(chunks.start)?;
    let last = layout.range_of(chunks.end.checked_sub(1)?)?;
    Some(first.start..last.end)
}

/// Clears a seek boost on drop unless it was replaced meanwhile.
struct BoostGuard {
    scheduler: Arc<Scheduler>,
    generation: u64,
}

impl Drop for BoostGuard {
    fn drop(&mut self) {
        self.scheduler.clear_target(Some(self.generation));
    }
}
