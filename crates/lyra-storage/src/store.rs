use std::{
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use rangemap::RangeSet;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{ChunkLayout, StorageError, StorageResult};

/// Upper bound for a single condvar sleep; waiters re-check cancellation this often.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Set on a Failed chunk whose retries are exhausted.
const TERMINAL: u8 = 0x80;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChunkState {
    Missing = 0,
    Downloading = 1,
    Ready = 2,
    Failed = 3,
}

impl ChunkState {
    fn from_bits(bits: u8) -> Self {
        match bits & !TERMINAL {
            1 => Self::Downloading,
            2 => Self::Ready,
            3 => Self::Failed,
            _ => Self::Missing,
        }
    }
}

/// Result of [`ChunkStore::mark_failed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailOutcome {
    /// The chunk may be reset to Missing and fetched again.
    Retry { attempts: u32 },
    /// Retries are exhausted; waiters on this chunk fail.
    Unavailable { attempts: u32 },
    /// The chunk was not being downloaded.
    Ignored,
}

/// Result of waiting for a byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    Unavailable { index: usize },
    TimedOut,
    Cancelled,
}

struct Slot {
    payload: Option<Bytes>,
    attempts: u32,
    touched: Instant,
}

struct StoreState {
    slots: Vec<Slot>,
    ready: RangeSet<u64>,
    cached_bytes: u64,
    ready_count: usize,
}

struct Inner {
    layout: ChunkLayout,
    max_attempts: u32,
    /// Mirror of each chunk's state, written under `state`, read lock-free.
    bits: Box<[AtomicU8]>,
    state: Mutex<StoreState>,
    condvar: Condvar,
    changed: watch::Sender<u64>,
}

/// Chunk table plus payload memory for one resource.
///
/// State transitions happen under one mutex and are mirrored into per-chunk
/// atomics, so `ready`/`chunks_ready` never take the lock. Ready payloads
/// are immutable until evicted.
#[derive(Clone)]
pub struct ChunkStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("layout", &self.inner.layout)
            .field("ready_count", &self.ready_count())
            .finish_non_exhaustive()
    }
}

impl ChunkStore {
    /// Empty table; a chunk becomes terminal after `max_attempts` failures.
    #[must_use]
    pub fn new(layout: ChunkLayout, max_attempts: u32) -> Self {
        let count = layout.num_chunks();
        let now = Instant::now();
        let slots = (0..count)
            .map(|_| Slot {
                payload: None,
                attempts: 0,
                touched: now,
            })
            .collect();
        let bits = (0..count).map(|_| AtomicU8::new(0)).collect();
        let (changed, _) = watch::channel(0);

        Self {
            inner: Arc::new(Inner {
                layout,
                max_attempts: max_attempts.max(1),
                bits,
                state: Mutex::new(StoreState {
                    slots,
                    ready: RangeSet::new(),
                    cached_bytes: 0,
                    ready_count: 0,
                }),
                condvar: Condvar::new(),
                changed,
            }),
        }
    }

    #[must_use]
    pub fn layout(&self) -> ChunkLayout {
        self.inner.layout
    }

    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.inner.bits.len()
    }

    fn bits(&self, index: usize) -> u8 {
        self.inner
            .bits
            .get(index)
            .map_or(0, |b| b.load(Ordering::Acquire))
    }

    fn set_bits(&self, index: usize, bits: u8) {
        self.inner.bits[index].store(bits, Ordering::Release);
    }

    fn check_index(&self, index: usize) -> StorageResult<()> {
        if index < self.num_chunks() {
            Ok(())
        } else {
            Err(StorageError::ChunkOutOfRange {
                index,
                count: self.num_chunks(),
            })
        }
    }

    fn notify(&self) {
        self.inner.condvar.notify_all();
        self.inner.changed.send_modify(|generation| *generation += 1);
    }

    // ---- lock-free readiness -------------------------------------------

    /// Current state of chunk `index`; out-of-range indices read as Missing.
    #[must_use]
    pub fn state(&self, index: usize) -> ChunkState {
        ChunkState::from_bits(self.bits(index))
    }

    /// True once chunk `index` failed more often than the retry cap allows.
    #[must_use]
    pub fn is_unavailable(&self, index: usize) -> bool {
        self.bits(index) & TERMINAL != 0
    }

    /// True iff the chunk covering `offset` is Ready.
    #[must_use]
    pub fn ready(&self, offset: u64) -> bool {
        self.inner
            .layout
            .index_of(offset)
            .is_some_and(|index| self.state(index) == ChunkState::Ready)
    }

    /// True iff the chunk at `offset` and the following `ahead_count - 1`
    /// chunks (clipped to the end of the resource) are Ready.
    #[must_use]
    pub fn chunks_ready(&self, offset: u64, ahead_count: usize) -> bool {
        let Some(first) = self.inner.layout.index_of(offset) else {
            return false;
        };
        let last = first
            .saturating_add(ahead_count.max(1) - 1)
            .min(self.inner.layout.last_index());
        (first..=last).all(|index| self.state(index) == ChunkState::Ready)
    }

    /// Non-blocking check of `range`: `Some` once the wait would resolve.
    #[must_use]
    pub fn poll_range(&self, range: &Range<u64>) -> Option<WaitOutcome> {
        let mut all_ready = true;
        for index in self.inner.layout.chunks_covering(range) {
            let bits = self.bits(index);
            if bits & TERMINAL != 0 {
                return Some(WaitOutcome::Unavailable { index });
            }
            all_ready &= ChunkState::from_bits(bits) == ChunkState::Ready;
        }
        all_ready.then_some(WaitOutcome::Ready)
    }

    #[must_use]
    pub fn is_range_ready(&self, range: &Range<u64>) -> bool {
        self.poll_range(range) == Some(WaitOutcome::Ready)
    }

    /// First chunk in `range` that is not Ready, if any.
    #[must_use]
    pub fn first_missing(&self, range: &Range<u64>) -> Option<usize> {
        self.inner
            .layout
            .chunks_covering(range)
            .find(|index| self.state(*index) != ChunkState::Ready)
    }

    // ---- scheduler-only mutators ----------------------------------------

    /// Missing → Downloading. Returns `false` if the chunk is in any other state,
    /// so exactly one worker can claim a chunk.
    pub fn mark_downloading(&self, index: usize) -> bool {
        if index >= self.num_chunks() {
            return false;
        }
        let _state = self.inner.state.lock();
        if self.state(index) != ChunkState::Missing {
            return false;
        }
        self.set_bits(index, ChunkState::Downloading as u8);
        trace!(chunk = index, "chunk claimed");
        true
    }

    /// Store `payload` for chunk `index` and mark it Ready.
    ///
    /// Returns `Ok(false)` if the chunk was already Ready.
    ///
    /// # Errors
    ///
    /// [`StorageError::ChunkOutOfRange`] or [`StorageError::PayloadSize`] when
    /// the payload does not match the chunk's byte range.
    pub fn mark_ready(&self, index: usize, payload: Bytes) -> StorageResult<bool> {
        self.check_index(index)?;
        let range = self
            .inner
            .layout
            .range_of(index)
            .ok_or(StorageError::ChunkOutOfRange {
                index,
                count: self.num_chunks(),
            })?;
        let expected = range.end - range.start;
        if payload.len() as u64 != expected {
            return Err(StorageError::PayloadSize {
                index,
                expected,
                got: payload.len() as u64,
            });
        }

        {
            let mut state = self.inner.state.lock();
            if self.state(index) == ChunkState::Ready {
                return Ok(false);
            }
            let slot = &mut state.slots[index];
            slot.payload = Some(payload);
            slot.touched = Instant::now();
            state.ready.insert(range);
            state.cached_bytes += expected;
            state.ready_count += 1;
            self.set_bits(index, ChunkState::Ready as u8);
        }
        trace!(chunk = index, "chunk ready");
        self.notify();
        Ok(true)
    }

    /// Record a failed download of chunk `index`.
    pub fn mark_failed(&self, index: usize) -> FailOutcome {
        if index >= self.num_chunks() {
            return FailOutcome::Ignored;
        }
        let outcome = {
            let mut state = self.inner.state.lock();
            if self.state(index) != ChunkState::Downloading {
                return FailOutcome::Ignored;
            }
            let slot = &mut state.slots[index];
            slot.attempts += 1;
            let attempts = slot.attempts;
            if attempts >= self.inner.max_attempts {
                self.set_bits(index, ChunkState::Failed as u8 | TERMINAL);
                FailOutcome::Unavailable { attempts }
            } else {
                self.set_bits(index, ChunkState::Failed as u8);
                FailOutcome::Retry { attempts }
            }
        };
        self.notify();
        outcome
    }

    /// Failed → Missing for a chunk that still has retries left.
    pub fn reset_failed(&self, index: usize) -> bool {
        let _state = self.inner.state.lock();
        if self.bits(index) != ChunkState::Failed as u8 {
            return false;
        }
        self.set_bits(index, ChunkState::Missing as u8);
        true
    }

    /// Downloading → Missing for an abandoned fetch; does not count as an attempt.
    pub fn release(&self, index: usize) -> bool {
        let _state = self.inner.state.lock();
        if self.state(index) != ChunkState::Downloading {
            return false;
        }
        self.set_bits(index, ChunkState::Missing as u8);
        true
    }

    /// Ready → Missing, dropping the payload.
    pub fn evict(&self, index: usize) -> bool {
        let mut state = self.inner.state.lock();
        self.evict_locked(&mut state, index)
    }

    fn evict_locked(&self, state: &mut StoreState, index: usize) -> bool {
        if self.state(index) != ChunkState::Ready {
            return false;
        }
        let Some(range) = self.inner.layout.range_of(index) else {
            return false;
        };
        state.slots[index].payload = None;
        state.ready.remove(range.clone());
        state.cached_bytes -= range.end - range.start;
        state.ready_count -= 1;
        self.set_bits(index, ChunkState::Missing as u8);
        true
    }

    /// Evict least recently touched Ready chunks until at most `budget` bytes
    /// are resident. Chunks for which `protected` returns true are kept.
    pub fn evict_lru(&self, budget: u64, protected: impl Fn(usize) -> bool) -> Vec<usize> {
        let mut evicted = Vec::new();
        let mut state = self.inner.state.lock();
        while state.cached_bytes > budget {
            let victim = state
                .slots
                .iter()
                .enumerate()
                .filter(|(index, slot)| slot.payload.is_some() && !protected(*index))
                .min_by_key(|(_, slot)| slot.touched)
                .map(|(index, _)| index);
            let Some(index) = victim else {
                break;
            };
            self.evict_locked(&mut state, index);
            evicted.push(index);
        }
        drop(state);
        if !evicted.is_empty() {
            trace!(chunks = ?evicted, "evicted chunks");
            self.notify();
        }
        evicted
    }

    /// Seed Ready chunks from bytes already in hand.
    ///
    /// Only chunks lying entirely inside `[offset, offset + data.len())` and
    /// currently Missing are filled. Returns how many chunks became Ready.
    pub fn inject(&self, offset: u64, data: &Bytes) -> usize {
        let end = offset + data.len() as u64;
        let mut injected = 0;
        {
            let mut state = self.inner.state.lock();
            for index in self.inner.layout.chunks_covering(&(offset..end)) {
                let Some(range) = self.inner.layout.range_of(index) else {
                    continue;
                };
                if range.start < offset || range.end > end || self.state(index) != ChunkState::Missing
                {
                    continue;
                }
                let slice = data.slice((range.start - offset) as usize..(range.end - offset) as usize);
                let slot = &mut state.slots[index];
                slot.payload = Some(slice);
                slot.touched = Instant::now();
                state.cached_bytes += range.end - range.start;
                state.ready_count += 1;
                state.ready.insert(range);
                self.set_bits(index, ChunkState::Ready as u8);
                injected += 1;
            }
        }
        if injected > 0 {
            self.notify();
        }
        injected
    }

    // ---- reads ----------------------------------------------------------

    /// Copy bytes starting at `offset` from contiguous Ready chunks.
    ///
    /// Stops at the first chunk that is not Ready; returns the bytes copied.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> usize {
        self.copy_out(offset, buf, true)
    }

    /// [`read_at`](Self::read_at) without recency bookkeeping, for fully cached resources.
    pub fn read_cached(&self, offset: u64, buf: &mut [u8]) -> usize {
        self.copy_out(offset, buf, false)
    }

    fn copy_out(&self, offset: u64, buf: &mut [u8], touch: bool) -> usize {
        let layout = self.inner.layout;
        let want = buf
            .len()
            .min(layout.total_size().saturating_sub(offset) as usize);
        if want == 0 {
            return 0;
        }

        let mut segments = Vec::with_capacity(2);
        {
            let mut state = self.inner.state.lock();
            let now = Instant::now();
            for index in layout.chunks_covering(&(offset..offset + want as u64)) {
                let slot = &mut state.slots[index];
                let Some(payload) = slot.payload.clone() else {
                    break;
                };
                if touch {
                    slot.touched = now;
                }
                segments.push((index, payload));
            }
        }

        let mut copied = 0;
        for (index, payload) in segments {
            let chunk_start = index as u64 * layout.chunk_size();
            let within = (offset + copied as u64 - chunk_start) as usize;
            let n = (want - copied).min(payload.len() - within);
            buf[copied..copied + n].copy_from_slice(&payload[within..within + n]);
            copied += n;
        }
        copied
    }

    /// Payload of chunk `index` if Ready.
    #[must_use]
    pub fn payload(&self, index: usize) -> Option<Bytes> {
        self.inner.state.lock().slots.get(index)?.payload.clone()
    }

    /// All payloads in order, when every chunk is Ready.
    #[must_use]
    pub fn payloads(&self) -> Option<Vec<Bytes>> {
        let state = self.inner.state.lock();
        state.slots.iter().map(|slot| slot.payload.clone()).collect()
    }

    // ---- accounting -----------------------------------------------------

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.inner.state.lock().ready_count
    }

    #[must_use]
    pub fn cached_bytes(&self) -> u64 {
        self.inner.state.lock().cached_bytes
    }

    #[must_use]
    pub fn fill_fraction(&self) -> f64 {
        self.cached_bytes() as f64 / self.inner.layout.total_size() as f64
    }

    #[must_use]
    pub fn is_fully_cached(&self) -> bool {
        self.ready_count() == self.num_chunks()
    }

    /// Length of the Ready prefix starting at byte 0.
    #[must_use]
    pub fn contiguous_prefix_len(&self) -> u64 {
        let state = self.inner.state.lock();
        state
            .ready
            .iter()
            .next()
            .filter(|range| range.start == 0)
            .map_or(0, |range| range.end)
    }

    /// Failed attempts recorded for chunk `index`.
    #[must_use]
    pub fn attempts(&self, index: usize) -> u32 {
        self.inner
            .state
            .lock()
            .slots
            .get(index)
            .map_or(0, |slot| slot.attempts)
    }

    // ---- waits ----------------------------------------------------------

    /// Receiver bumped on every state transition.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    /// Suspend until every chunk of `range` is Ready, one of them becomes
    /// unavailable, or `cancel` fires.
    pub async fn wait_ready(&self, range: Range<u64>, cancel: &CancellationToken) -> WaitOutcome {
        let mut changes = self.inner.changed.subscribe();
        loop {
            if let Some(outcome) = self.poll_range(&range) {
                return outcome;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return WaitOutcome::Cancelled,
                changed = changes.changed() => {
                    if changed.is_err() {
                        return WaitOutcome::Cancelled;
                    }
                }
            }
        }
    }

    /// Blocking variant of [`wait_ready`](Self::wait_ready) for threads that
    /// cannot suspend. Gives up after `timeout`.
    pub fn wait_ready_blocking(
        &self,
        range: Range<u64>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }
            if let Some(outcome) = self.poll_range(&range) {
                return outcome;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            self.inner
                .condvar
                .wait_for(&mut state, (deadline - now).min(WAIT_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::*;

    use super::*;

    const CHUNK: u64 = 100;

    fn payload(index: usize, layout: ChunkLayout) -> Bytes {
        Bytes::from(vec![index as u8; layout.len_of(index) as usize])
    }

    #[fixture]
    fn store() -> ChunkStore {
        ChunkStore::new(ChunkLayout::new(CHUNK, 1050).unwrap(), 3)
    }

    fn fill(store: &ChunkStore, index: usize) {
        assert!(store.mark_downloading(index));
        store
            .mark_ready(index, payload(index, store.layout()))
            .unwrap();
    }

    #[rstest]
    fn coverage_matches_chunk_state(store: ChunkStore) {
        fill(&store, 2);
        fill(&store, 10);
        for offset in 0..1050 {
            let index = store.layout().index_of(offset).unwrap();
            let expected = store.state(index) == ChunkState::Ready;
            assert_eq!(store.ready(offset), expected, "offset {offset}");
        }
        assert!(!store.ready(1050));
    }

    #[rstest]
    fn chunks_ready_is_idempotent(store: ChunkStore) {
        fill(&store, 0);
        fill(&store, 1);
        let first = store.chunks_ready(0, 3);
        for _ in 0..10 {
            assert_eq!(store.chunks_ready(0, 3), first);
        }
        assert!(!first);
        assert!(store.chunks_ready(0, 2));
    }

    #[rstest]
    #[case::zero_means_one(50, 0, true)]
    #[case::single(50, 1, true)]
    #[case::clipped_at_end(1000, 5, true)]
    #[case::gap(850, 3, false)]
    #[case::past_end(2000, 1, false)]
    fn chunks_ready_window(
        store: ChunkStore,
        #[case] offset: u64,
        #[case] ahead: usize,
        #[case] expected: bool,
    ) {
        for index in [0, 8, 10] {
            fill(&store, index);
        }
        assert_eq!(store.chunks_ready(offset, ahead), expected);
    }

    #[rstest]
    fn chunk_is_claimed_once(store: ChunkStore) {
        assert!(store.mark_downloading(4));
        assert!(!store.mark_downloading(4));
        assert_eq!(store.state(4), ChunkState::Downloading);
        assert!(store.release(4));
        assert_eq!(store.state(4), ChunkState::Missing);
    }

    #[rstest]
    fn concurrent_claims_have_one_winner(store: ChunkStore) {
        let winners: usize = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| usize::from(store.mark_downloading(7))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1);
    }

    #[rstest]
    fn wrong_payload_size_is_rejected(store: ChunkStore) {
        assert!(matches!(
            store.mark_ready(10, Bytes::from_static(&[0; 100])),
            Err(StorageError::PayloadSize { index: 10, expected: 50, got: 100 })
        ));
        assert!(matches!(
            store.mark_ready(11, Bytes::new()),
            Err(StorageError::ChunkOutOfRange { index: 11, .. })
        ));
    }

    #[rstest]
    fn failures_escalate_to_unavailable(store: ChunkStore) {
        for attempt in 1..3 {
            assert!(store.mark_downloading(5));
            assert_eq!(store.mark_failed(5), FailOutcome::Retry { attempts: attempt });
            assert!(!store.is_unavailable(5));
            assert!(store.reset_failed(5));
        }
        assert!(store.mark_downloading(5));
        assert_eq!(store.mark_failed(5), FailOutcome::Unavailable { attempts: 3 });
        assert!(store.is_unavailable(5));
        assert_eq!(store.state(5), ChunkState::Failed);
        assert!(!store.reset_failed(5));
        assert_eq!(
            store.poll_range(&(450..600)),
            Some(WaitOutcome::Unavailable { index: 5 })
        );
    }

    #[rstest]
    fn mark_failed_requires_download(store: ChunkStore) {
        assert_eq!(store.mark_failed(1), FailOutcome::Ignored);
        assert_eq!(store.attempts(1), 0);
    }

    #[rstest]
    fn read_at_spans_chunks(store: ChunkStore) {
        fill(&store, 0);
        fill(&store, 1);
        let mut buf = [0u8; 150];
        assert_eq!(store.read_at(50, &mut buf), 150);
        assert!(buf[..50].iter().all(|b| *b == 0));
        assert!(buf[50..].iter().all(|b| *b == 1));
    }

    #[rstest]
    fn read_stops_at_gap_and_end(store: ChunkStore) {
        fill(&store, 0);
        fill(&store, 10);
        let mut buf = [0u8; 300];
        assert_eq!(store.read_at(0, &mut buf), 100);
        assert_eq!(store.read_at(1040, &mut buf), 10);
        assert_eq!(store.read_at(1050, &mut buf), 0);
        assert_eq!(store.read_at(500, &mut buf), 0);
    }

    #[rstest]
    fn accounting_tracks_ready_chunks(store: ChunkStore) {
        assert_eq!(store.contiguous_prefix_len(), 0);
        fill(&store, 0);
        fill(&store, 1);
        fill(&store, 10);
        assert_eq!(store.ready_count(), 3);
        assert_eq!(store.cached_bytes(), 250);
        assert_eq!(store.contiguous_prefix_len(), 200);
        assert!(!store.is_fully_cached());
        assert!(store.payloads().is_none());
        for index in 2..10 {
            fill(&store, index);
        }
        assert!(store.is_fully_cached());
        assert!((store.fill_fraction() - 1.0).abs() < f64::EPSILON);
        assert_eq!(store.contiguous_prefix_len(), 1050);
        assert_eq!(store.payloads().map(|p| p.len()), Some(11));
    }

    #[rstest]
    fn inject_fills_whole_chunks_only(store: ChunkStore) {
        let data = Bytes::from(vec![9u8; 250]);
        assert_eq!(store.inject(50, &data), 2);
        assert_eq!(store.state(0), ChunkState::Missing);
        assert_eq!(store.state(1), ChunkState::Ready);
        assert_eq!(store.state(2), ChunkState::Ready);
        assert_eq!(store.state(3), ChunkState::Missing);

        let whole = Bytes::from(vec![1u8; 1050]);
        assert_eq!(store.inject(0, &whole), 9);
        assert!(store.is_fully_cached());
    }

    #[rstest]
    fn evict_lru_keeps_protected_and_recent(store: ChunkStore) {
        for index in 0..4 {
            fill(&store, index);
            thread::sleep(Duration::from_millis(2));
        }
        let mut buf = [0u8; 10];
        store.read_at(0, &mut buf);

        let evicted = store.evict_lru(200, |index| index == 1);

        assert_eq!(evicted, vec![2, 3]);
        assert_eq!(store.state(0), ChunkState::Ready);
        assert_eq!(store.state(1), ChunkState::Ready);
        assert_eq!(store.state(2), ChunkState::Missing);
        assert_eq!(store.cached_bytes(), 200);
        assert!(store.mark_downloading(2));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn async_wait_resolves_on_ready(store: ChunkStore) {
        let cancel = CancellationToken::new();
        let writer = store.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fill(&writer, 3);
        });
        assert_eq!(store.wait_ready(300..400, &cancel).await, WaitOutcome::Ready);
        task.await.unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn async_wait_observes_cancel(store: ChunkStore) {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(store.wait_ready(0..10, &cancel).await, WaitOutcome::Cancelled);
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    fn blocking_wait_resolves_on_ready(store: ChunkStore) {
        let cancel = CancellationToken::new();
        let writer = store.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            fill(&writer, 6);
        });
        assert_eq!(
            store.wait_ready_blocking(600..700, Duration::from_secs(2), &cancel),
            WaitOutcome::Ready
        );
        handle.join().unwrap();
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    fn blocking_wait_times_out(store: ChunkStore) {
        let cancel = CancellationToken::new();
        assert_eq!(
            store.wait_ready_blocking(0..10, Duration::from_millis(60), &cancel),
            WaitOutcome::TimedOut
        );
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    fn blocking_wait_sees_unavailable(store: ChunkStore) {
        let cancel = CancellationToken::new();
        let writer = ChunkStore::new(store.layout(), 1);
        let reader = writer.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            assert!(writer.mark_downloading(0));
            writer.mark_failed(0);
        });
        assert_eq!(
            reader.wait_ready_blocking(0..10, Duration::from_secs(2), &cancel),
            WaitOutcome::Unavailable { index: 0 }
        );
        handle.join().unwrap();
    }

    #[rstest]
    fn empty_range_is_ready(store: ChunkStore) {
        assert_eq!(store.poll_range(&(10..10)), Some(WaitOutcome::Ready));
    }
}
