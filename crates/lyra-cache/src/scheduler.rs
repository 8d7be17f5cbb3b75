use std::{
    collections::HashMap,
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use lyra_events::{BufferingState, CacheEvent, EventBus};
use lyra_net::{NetResult, RangeFetcher};
use lyra_storage::{CacheDir, ChunkState, ChunkStore, FailOutcome, WaitOutcome};
use parking_lot::Mutex;
use tokio::{
    sync::Notify,
    task::{self, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    config::CacheConfig,
    error::CacheError,
    priority::{PlanContext, SeekTarget, Tier},
    throughput::ThroughputEstimator,
};

#[derive(Debug)]
struct BoostTarget {
    offset: u64,
    chunk: usize,
    generation: u64,
    /// Cancelled once this target is replaced or cleared.
    released: CancellationToken,
}

/// An installed seek target.
pub(crate) struct Boost {
    pub(crate) generation: u64,
    pub(crate) released: CancellationToken,
}

#[derive(Debug)]
struct Window {
    id: u64,
    chunks: Range<usize>,
}

#[derive(Debug, Default)]
struct Priority {
    target: Option<BoostTarget>,
    windows: Vec<Window>,
    /// Failed chunks and the instant they may be retried.
    backoff: HashMap<usize, Instant>,
    next_id: u64,
}

/// A finished fetch: chunk, time on the wire, payload.
type Fetched = (usize, Duration, NetResult<Bytes>);

#[derive(Default)]
struct Inflight {
    tasks: JoinSet<Fetched>,
    ids: HashMap<task::Id, (usize, Tier)>,
    background: usize,
}

/// Background download loop for one resource plus the shared priority
/// state that callers steer it with.
pub(crate) struct Scheduler {
    pub(crate) store: ChunkStore,
    pub(crate) config: CacheConfig,
    pub(crate) cancel: CancellationToken,
    resource_id: String,
    fetcher: RangeFetcher,
    bus: EventBus,
    persist: Option<CacheDir>,
    cursor: AtomicU64,
    playing: AtomicBool,
    buffering: AtomicU8,
    completed: AtomicBool,
    priority: Mutex<Priority>,
    throughput: Mutex<ThroughputEstimator>,
    wake: Notify,
}

impl Scheduler {
    pub(crate) fn new(
        resource_id: String,
        store: ChunkStore,
        fetcher: RangeFetcher,
        config: CacheConfig,
        bus: EventBus,
        persist: Option<CacheDir>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            config,
            cancel,
            resource_id,
            fetcher,
            bus,
            persist,
            cursor: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            buffering: AtomicU8::new(BufferingState::Idle as u8),
            completed: AtomicBool::new(false),
            priority: Mutex::new(Priority::default()),
            throughput: Mutex::new(ThroughputEstimator::new()),
            wake: Notify::new(),
        }
    }

    pub(crate) fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ---- steering -------------------------------------------------------

    pub(crate) fn set_cursor(&self, offset: u64) {
        let previous = self.cursor.swap(offset, Ordering::AcqRel);
        if previous != offset {
            self.wake.notify_one();
            self.evaluate_health();
        }
    }

    pub(crate) fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        if self.playing.swap(playing, Ordering::AcqRel) != playing {
            trace!(playing, "playback state changed");
            self.wake.notify_one();
            self.evaluate_health();
        }
    }

    /// Point the seek tier at `offset`, replacing any previous target.
    /// [`clear_target`](Self::clear_target) needs the returned generation to
    /// undo it; the returned token fires once it is gone.
    pub(crate) fn set_target(&self, offset: u64) -> Boost {
        let chunk = self.store.layout().clamped_index_of(offset);
        let released = self.cancel.child_token();
        let generation = {
            let mut priority = self.priority.lock();
            priority.next_id += 1;
            let generation = priority.next_id;
            let previous = priority.target.replace(BoostTarget {
                offset,
                chunk,
                generation,
                released: released.clone(),
            });
            if let Some(previous) = previous {
                previous.released.cancel();
            }
            generation
        };
        debug!(offset, chunk, generation, "seek target set");
        self.wake.notify_one();
        Boost {
            generation,
            released,
        }
    }

    /// Drop the seek target. With `Some(generation)` only a target that is
    /// still the one installed under that generation is removed.
    pub(crate) fn clear_target(&self, generation: Option<u64>) -> bool {
        let cleared = {
            let mut priority = self.priority.lock();
            let matches = priority
                .target
                .as_ref()
                .is_some_and(|target| generation.is_none_or(|g| target.generation == g));
            match priority.target.take_if(|_| matches) {
                Some(target) => {
                    target.released.cancel();
                    true
                }
                None => false,
            }
        };
        if cleared {
            debug!(?generation, "seek target cleared");
            self.wake.notify_one();
        }
        cleared
    }

    pub(crate) fn has_boost(&self) -> bool {
        self.priority.lock().target.is_some()
    }

    /// Register a temporary window; it is removed when the guard drops.
    pub(crate) fn add_window(self: &Arc<Self>, chunks: Range<usize>) -> WindowGuard {
        let id = {
            let mut priority = self.priority.lock();
            priority.next_id += 1;
            let id = priority.next_id;
            priority.windows.push(Window { id, chunks });
            id
        };
        self.wake.notify_one();
        WindowGuard {
            scheduler: Arc::clone(self),
            id,
        }
    }

    fn remove_window(&self, id: u64) {
        self.priority.lock().windows.retain(|w| w.id != id);
        self.wake.notify_one();
    }

    fn plan_context(&self) -> PlanContext {
        let layout = self.store.layout();
        let num_chunks = layout.num_chunks();
        let cursor = self.cursor();
        let near_end =
            |offset: u64| offset as f64 >= layout.total_size() as f64 * self.config.near_end_threshold;
        let lookahead = if self.playing.load(Ordering::Acquire) {
            if self.is_slow() {
                self.config.playing_lookahead_chunks.saturating_mul(2)
            } else {
                self.config.playing_lookahead_chunks
            }
        } else {
            self.config.lookahead_chunks
        };

        let priority = self.priority.lock();
        let tail = (near_end(cursor) || priority.target.as_ref().is_some_and(|t| near_end(t.offset)))
            .then(|| num_chunks.saturating_sub(self.config.tail_chunks)..num_chunks);

        PlanContext {
            num_chunks,
            cursor_chunk: layout.clamped_index_of(cursor),
            target: priority.target.as_ref().map(|t| SeekTarget { chunk: t.chunk }),
            windows: priority.windows.iter().map(|w| w.chunks.clone()).collect(),
            lookahead,
            behind: self.config.behind_chunks,
            boost_window: self.config.seek_boost_window,
            tail,
            background: self.config.max_resident_bytes.is_none(),
        }
    }

    // ---- throughput -----------------------------------------------------

    fn record_fetch(&self, index: usize, elapsed: Duration, result: &NetResult<Bytes>) {
        if let Ok(payload) = result {
            let mut throughput = self.throughput.lock();
            throughput.push_sample(payload.len() as u64, elapsed);
            trace!(chunk = index, ?elapsed, rate = ?throughput.bytes_per_sec(), "fetch measured");
        }
    }

    pub(crate) fn bytes_per_sec(&self) -> Option<u64> {
        self.throughput.lock().bytes_per_sec()
    }

    pub(crate) fn time_for(&self, bytes: u64) -> Option<Duration> {
        self.throughput.lock().time_for(bytes)
    }

    /// One chunk takes longer than `slow_chunk_fetch` at the measured rate.
    fn is_slow(&self) -> bool {
        self.time_for(self.config.chunk_size)
            .is_some_and(|eta| eta > self.config.slow_chunk_fetch)
    }

    // ---- health ---------------------------------------------------------

    /// Recompute the buffering state from the cursor and publish a
    /// transition if it changed.
    pub(crate) fn evaluate_health(&self) -> (BufferingState, usize, usize) {
        let layout = self.store.layout();
        let num_chunks = layout.num_chunks();
        let cursor_chunk = layout.clamped_index_of(self.cursor());
        let remaining = num_chunks - cursor_chunk;
        let required = self.config.min_ready_chunks.min(remaining.max(1)).max(1);
        let ready_ahead = (cursor_chunk..num_chunks)
            .take(required)
            .take_while(|&i| self.store.state(i) == ChunkState::Ready)
            .count();

        let state = match (ready_ahead >= required, self.playing.load(Ordering::Acquire)) {
            (true, true) => BufferingState::Playing,
            (true, false) => BufferingState::Ready,
            (false, true) => BufferingState::LowBuffer,
            (false, false) => BufferingState::Buffering,
        };
        self.set_buffering(state);
        (state, ready_ahead, required)
    }

    pub(crate) fn buffering(&self) -> BufferingState {
        BufferingState::from_u8(self.buffering.load(Ordering::Acquire))
    }

    fn set_buffering(&self, state: BufferingState) {
        let previous = self.buffering.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            debug!(from = %BufferingState::from_u8(previous), to = %state, "buffering state changed");
            self.bus.publish(CacheEvent::BufferingStateChanged { state });
        }
    }

    // ---- download loop --------------------------------------------------

    pub(crate) async fn run(self: Arc<Self>) {
        debug!(
            resource = %self.resource_id,
            chunks = self.store.num_chunks(),
            "scheduler started"
        );
        let mut inflight = Inflight::default();

        loop {
            self.reset_due_backoff();
            self.dispatch(&mut inflight);

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(joined) = inflight.tasks.join_next_with_id(), if !inflight.tasks.is_empty() => {
                    self.on_joined(&mut inflight, joined);
                }
                () = self.wake.notified() => {}
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        inflight.tasks.abort_all();
        for (_, (index, _)) in inflight.ids.drain() {
            self.store.release(index);
        }
        debug!(resource = %self.resource_id, "scheduler stopped");
    }

    fn dispatch(&self, inflight: &mut Inflight) {
        let free = self
            .config
            .max_concurrency
            .max(1)
            .saturating_sub(inflight.tasks.len());
        if free == 0 {
            return;
        }

        let layout = self.store.layout();
        let ctx = self.plan_context();
        let candidates = ctx.plan(|i| self.store.state(i) == ChunkState::Missing, free);

        for candidate in candidates {
            if candidate.tier == Tier::Background
                && inflight.background >= self.config.background_concurrency
            {
                break;
            }
            let Some(range) = layout.range_of(candidate.index) else {
                continue;
            };
            if !self.store.mark_downloading(candidate.index) {
                continue;
            }
            trace!(chunk = candidate.index, tier = ?candidate.tier, "fetch dispatched");

            let fetcher = self.fetcher.clone();
            let index = candidate.index;
            let handle = inflight.tasks.spawn(async move {
                let started = Instant::now();
                let result = fetcher.fetch(range).await;
                (index, started.elapsed(), result)
            });
            inflight.ids.insert(handle.id(), (index, candidate.tier));
            if candidate.tier == Tier::Background {
                inflight.background += 1;
            }
        }
    }

    fn on_joined(
        &self,
        inflight: &mut Inflight,
        joined: Result<(task::Id, Fetched), task::JoinError>,
    ) {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(error) => error.id(),
        };
        let Some((index, tier)) = inflight.ids.remove(&id) else {
            return;
        };
        if tier == Tier::Background {
            inflight.background = inflight.background.saturating_sub(1);
        }

        match joined {
            Ok((_, (index, elapsed, result))) => {
                self.record_fetch(index, elapsed, &result);
                self.complete(index, result);
            }
            Err(error) => {
                warn!(chunk = index, %error, "fetch task ended abnormally");
                self.store.release(index);
            }
        }
    }

    fn reset_due_backoff(&self) {
        let now = Instant::now();
        let mut due = Vec::new();
        self.priority.lock().backoff.retain(|&index, at| {
            if *at <= now {
                due.push(index);
                false
            } else {
                true
            }
        });
        for index in due {
            if self.store.reset_failed(index) {
                trace!(chunk = index, "retry window open");
            }
        }
    }

    /// Apply a finished fetch to the store and publish its consequences.
    pub(crate) fn complete(&self, index: usize, result: NetResult<Bytes>) {
        match result {
            Ok(payload) => match self.store.mark_ready(index, payload) {
                Ok(true) => self.on_ready(index),
                Ok(false) => {}
                Err(error) => {
                    warn!(chunk = index, %error, "discarding malformed chunk");
                    self.on_failed(index, &CacheError::Storage(error));
                }
            },
            Err(source) => self.on_failed(index, &CacheError::ChunkFetchFailed { index, source }),
        }
        self.evaluate_health();
        self.wake.notify_one();
    }

    fn on_ready(&self, index: usize) {
        let layout = self.store.layout();
        self.bus.publish(CacheEvent::ChunkReady {
            index,
            cached_bytes: self.store.cached_bytes(),
            total_bytes: layout.total_size(),
        });

        if let Some(budget) = self.config.max_resident_bytes {
            let ctx = self.plan_context();
            let evicted = self.store.evict_lru(budget, |i| ctx.protects(i));
            if !evicted.is_empty() {
                debug!(?evicted, budget, "evicted chunks over memory budget");
            }
        }

        if self.store.is_fully_cached() && !self.completed.swap(true, Ordering::AcqRel) {
            info!(resource = %self.resource_id, total = layout.total_size(), "resource fully cached");
            self.bus.publish(CacheEvent::FullyCached {
                total_bytes: layout.total_size(),
            });
            self.persist();
        }
    }

    fn on_failed(&self, index: usize, error: &CacheError) {
        match self.store.mark_failed(index) {
            FailOutcome::Retry { attempts } => {
                let delay = self.config.chunk_retry_delay(attempts);
                self.priority
                    .lock()
                    .backoff
                    .insert(index, Instant::now() + delay);
                warn!(chunk = index, attempts, ?delay, %error, "chunk fetch failed, will retry");
                self.bus.publish(CacheEvent::ChunkFailed { index, attempts });
            }
            FailOutcome::Unavailable { attempts } => {
                warn!(chunk = index, attempts, %error, "{}", CacheError::ChunkUnavailable { index });
                self.bus.publish(CacheEvent::ChunkUnavailable { index });
            }
            FailOutcome::Ignored => {}
        }
    }

    /// Mark the resource as already complete, e.g. after loading it from disk.
    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    fn persist(&self) {
        let Some(dir) = self.persist.clone() else {
            return;
        };
        let Some(payloads) = self.store.payloads() else {
            return;
        };
        let id = self.resource_id.clone();
        let write = move || match dir.store(&id, &payloads) {
            Ok(path) => debug!(resource = %id, path = %path.display(), "cache written to disk"),
            Err(error) => warn!(resource = %id, %error, "failed to write cache to disk"),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }

    // ---- caller-driven fetches and waits --------------------------------

    /// Fetch chunk `index` out of band, bypassing the queue. The fetch runs
    /// on its own task and is not rolled back if the requester goes away.
    pub(crate) fn spawn_rescue(self: &Arc<Self>, index: usize) {
        let Some(range) = self.store.layout().range_of(index) else {
            return;
        };
        if !self.store.mark_downloading(index) {
            return;
        }
        debug!(chunk = index, "range rescue");
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let claim = ClaimGuard {
                store: scheduler.store.clone(),
                index,
                armed: true,
            };
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                () = scheduler.cancel.cancelled() => return,
                result = scheduler.fetcher.fetch(range) => result,
            };
            claim.disarm();
            scheduler.record_fetch(index, started.elapsed(), &result);
            scheduler.complete(index, result);
        });
    }

    /// Wait until `range` is Ready, bounded by `timeout`, `cancel` and the
    /// scheduler's own lifetime.
    pub(crate) async fn wait_range(
        &self,
        range: Range<u64>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let wait = async {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => WaitOutcome::Cancelled,
                outcome = self.store.wait_ready(range, cancel) => outcome,
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(WaitOutcome::TimedOut)
    }

    /// Prioritize `count` chunks from the one holding `offset` and wait for
    /// them. With `rescue` the first missing chunk is fetched immediately.
    pub(crate) async fn prefetch(
        self: Arc<Self>,
        offset: u64,
        count: usize,
        cancel: CancellationToken,
        rescue: bool,
    ) -> WaitOutcome {
        let layout = self.store.layout();
        let Some(first) = layout.index_of(offset) else {
            return WaitOutcome::Unavailable { index: layout.num_chunks() };
        };
        let chunks = first..first.saturating_add(count.max(1)).min(layout.num_chunks());
        let Some(range) = layout
            .range_of(chunks.start)
            .zip(layout.range_of(chunks.end - 1))
            .map(|(a, b)| a.start..b.end)
        else {
            return WaitOutcome::Unavailable { index: first };
        };

        let _window = self.add_window(chunks.clone());
        if rescue
            && let Some(index) = chunks
                .clone()
                .find(|&i| self.store.state(i) == ChunkState::Missing)
        {
            self.spawn_rescue(index);
        }

        let outcome = self
            .wait_range(range, self.config.ready_timeout, &cancel)
            .await;
        trace!(offset, count, ?outcome, "prefetch finished");
        outcome
    }
}

/// Removes a prefetch window on drop.
pub(crate) struct WindowGuard {
    scheduler: Arc<Scheduler>,
    id: u64,
}

impl Drop for WindowGuard {
    fn drop(&mut self) {
        self.scheduler.remove_window(self.id);
    }
}

/// Returns a claimed chunk to Missing if its fetch never completes.
struct ClaimGuard {
    store: ChunkStore,
    index: usize,
    armed: bool,
}

impl ClaimGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if self.armed {
            self.store.release(self.index);
        }
    }
}
