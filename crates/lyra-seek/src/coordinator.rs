use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use lyra_cache::StreamingCache;
use lyra_events::{EventBus, SeekEvent};
use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::{Notify, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    config::SeekConfig,
    engine::{DecodeEngine, bytes_to_seconds, seconds_to_bytes},
    outcome::SeekOutcome,
    tracker::PositionTracker,
};

/// One accepted seek intent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeekRequest {
    pub target_seconds: f64,
    /// Display position when the request was made.
    pub origin_seconds: f64,
    pub is_preview: bool,
    pub version: u64,
}

/// Engine state captured before a long seek, used to undo it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingSeekContext {
    origin_bytes: u64,
    was_playing: bool,
    was_paused: bool,
    /// Set once deferred buffering paused playback.
    paused_for_deferral: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CancelReason {
    Superseded,
    /// Undo position and play state.
    Restore,
    /// Undo play state only.
    Abandon,
    Stop,
}

#[derive(Debug)]
struct Pending {
    request: SeekRequest,
    due: Instant,
}

#[derive(Debug)]
struct Executing {
    version: u64,
    cancel: CancellationToken,
    reason: Option<CancelReason>,
    context: Option<PendingSeekContext>,
}

#[derive(Default)]
struct State {
    cache: Option<StreamingCache>,
    version: u64,
    pending: Option<Pending>,
    executing: Option<Executing>,
    last_success: Option<bool>,
    last_outcome: Option<SeekOutcome>,
    consecutive_failures: u32,
    completion_requested: bool,
}

struct Inner {
    engine: Arc<dyn DecodeEngine>,
    config: SeekConfig,
    bus: EventBus,
    tracker: PositionTracker,
    state: Mutex<State>,
    wake: Notify,
    idle: watch::Sender<bool>,
    runtime: Handle,
    cancel: CancellationToken,
}

/// Turns a stream of seek requests into at most one executing seek at a
/// time.
///
/// Requests are debounced and last-writer-wins: each one bumps a version
/// and replaces whatever is still pending. A request arriving while a seek
/// executes cancels it; the replacement starts only after the old one has
/// unwound.
///
/// With a [`StreamingCache`] attached, committed jumps wait for the target
/// to be cached (long jumps) or prefetch it after moving (short jumps).
/// Without one, every jump goes straight to the engine.
pub struct SeekCoordinator {
    inner: Arc<Inner>,
}

impl SeekCoordinator {
    /// # Panics
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(engine: Arc<dyn DecodeEngine>, config: SeekConfig, bus: EventBus) -> Self {
        let (idle, _) = watch::channel(true);
        let inner = Arc::new(Inner {
            engine,
            config,
            bus,
            tracker: PositionTracker::new(),
            state: Mutex::new(State::default()),
            wake: Notify::new(),
            idle,
            runtime: Handle::current(),
            cancel: CancellationToken::new(),
        });
        inner.runtime.spawn(Arc::clone(&inner).drive());
        Self { inner }
    }

    /// Attach the cache for the current track, or `None` for direct mode.
    pub fn set_cache(&self, cache: Option<StreamingCache>) {
        let mode = if cache.is_some() { "cache" } else { "direct" };
        self.inner.state.lock().cache = cache;
        debug!(mode, "seek stream mode");
    }

    /// Accept a seek to `target_seconds`. Returns its version.
    pub fn request_seek(&self, target_seconds: f64, is_preview: bool) -> u64 {
        let inner = &self.inner;
        if inner.cancel.is_cancelled() {
            return self.latest_version();
        }
        let origin_seconds = self.effective_position();

        let version = {
            let mut state = inner.state.lock();
            state.version += 1;
            let version = state.version;
            state.pending = Some(Pending {
                request: SeekRequest {
                    target_seconds,
                    origin_seconds,
                    is_preview,
                    version,
                },
                due: Instant::now() + inner.config.debounce,
            });
            if let Some(exec) = state.executing.as_mut() {
                inner.cancel_executing(exec, CancelReason::Superseded);
            }
            inner.refresh_idle(&state);
            version
        };

        inner
            .tracker
            .on_seek_requested(target_seconds, is_preview, version);
        debug!(version, target_seconds, is_preview, "seek requested");
        inner.bus.publish(SeekEvent::Requested {
            target_seconds,
            origin_seconds,
            is_preview,
            version,
        });
        inner.wake.notify_one();
        version
    }

    /// End of the user's seek gesture. Stops the debounce timer, dropping a
    /// request still waiting on it, and reports completion with the last
    /// known result. A seek already executing runs to the end and the
    /// completion follows it.
    pub fn finish_seek(&self) {
        let inner = &self.inner;
        let completion = {
            let mut state = inner.state.lock();
            state.completion_requested = true;
            if let Some(pending) = state.pending.take() {
                trace!(version = pending.request.version, "debounced seek dropped on finish");
            }
            inner.refresh_idle(&state);
            inner.take_completion(&mut state)
        };
        match completion {
            Some(success) => inner.publish_completed(success),
            None => debug!("seek sequence finishing"),
        }
        inner.wake.notify_one();
    }

    /// Drop the pending request and cancel the executing one. Nothing is
    /// restored.
    pub fn cancel_pending_seeks(&self) {
        let inner = &self.inner;
        let completion = {
            let mut state = inner.state.lock();
            state.pending = None;
            if let Some(exec) = state.executing.as_mut() {
                inner.cancel_executing(exec, CancelReason::Stop);
            }
            inner.refresh_idle(&state);
            inner.take_completion(&mut state)
        };
        debug!("pending seeks cancelled");
        if let Some(success) = completion {
            inner.publish_completed(success);
        }
    }

    /// Cancel a waiting long seek and put the engine back at its origin
    /// position and play state. Returns false when no long seek was waiting.
    pub fn cancel_pending_seek_and_restore(&self) -> bool {
        let inner = &self.inner;
        let restored = {
            let mut state = inner.state.lock();
            state.pending = None;
            let restored = match state.executing.as_mut() {
                Some(exec) if exec.context.is_some() && exec.reason.is_none() => {
                    inner.cancel_executing(exec, CancelReason::Restore);
                    true
                }
                _ => false,
            };
            inner.refresh_idle(&state);
            restored
        };
        if restored {
            info!("long seek cancelled, origin restored");
        }
        restored
    }

    /// Cancel a waiting long seek and restore only the play state.
    pub fn cancel_pending_long_seek(&self) -> bool {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        match state.executing.as_mut() {
            Some(exec) if exec.context.is_some() && exec.reason.is_none() => {
                inner.cancel_executing(exec, CancelReason::Abandon);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_seeking(&self) -> bool {
        let state = self.inner.state.lock();
        state.pending.is_some() || state.executing.is_some()
    }

    /// The request waiting out its debounce, if any.
    #[must_use]
    pub fn pending_request(&self) -> Option<SeekRequest> {
        self.inner.state.lock().pending.as_ref().map(|p| p.request)
    }

    #[must_use]
    pub fn latest_version(&self) -> u64 {
        self.inner.state.lock().version
    }

    #[must_use]
    pub fn last_outcome(&self) -> Option<SeekOutcome> {
        self.inner.state.lock().last_outcome
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.state.lock().consecutive_failures
    }

    /// Resolve once nothing is pending or executing.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Playback position in seconds for display, corrected for seeks in flight.
    #[must_use]
    pub fn effective_position(&self) -> f64 {
        let engine = self.inner.engine.as_ref();
        let position = bytes_to_seconds(engine, engine.current_position_bytes());
        self.inner
            .tracker
            .effective_position(position, engine.duration_seconds(), engine.is_playing())
    }

    #[must_use]
    pub fn tracker(&self) -> &PositionTracker {
        &self.inner.tracker
    }

    /// Cancel everything and stop the timer task.
    pub fn dispose(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.cancel_pending_seeks();
        self.inner.cancel.cancel();
    }
}

impl Drop for SeekCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Inner {
    // ---- timer ----------------------------------------------------------

    async fn drive(self: Arc<Self>) {
        loop {
            let due = {
                let state = self.state.lock();
                if state.executing.is_some() {
                    None
                } else {
                    state.pending.as_ref().map(|p| p.due)
                }
            };
            let deadline = tokio::time::Instant::from_std(due.unwrap_or_else(Instant::now));

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = self.wake.notified() => {}
                () = tokio::time::sleep_until(deadline), if due.is_some() => self.promote(),
            }
        }
        trace!("seek timer stopped");
    }

    /// Start the pending request if its debounce has elapsed and nothing
    /// else is executing.
    fn promote(self: &Arc<Self>) {
        let (request, cancel, cache) = {
            let mut state = self.state.lock();
            if state.executing.is_some()
                || !state
                    .pending
                    .as_ref()
                    .is_some_and(|p| p.due <= Instant::now())
            {
                return;
            }
            let Some(Pending { request, .. }) = state.pending.take() else {
                return;
            };
            if request.version != state.version {
                trace!(version = request.version, latest = state.version, "stale seek dropped");
                return;
            }
            let cancel = self.cancel.child_token();
            state.executing = Some(Executing {
                version: request.version,
                cancel: cancel.clone(),
                reason: None,
                context: None,
            });
            (request, cancel, state.cache.clone())
        };

        debug!(
            version = request.version,
            target_seconds = request.target_seconds,
            is_preview = request.is_preview,
            "seek executing"
        );
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = inner.execute(request, &cancel, cache).await;
            inner.finish_op(request, outcome);
        });
    }

    // ---- strategies -----------------------------------------------------

    async fn execute(
        self: &Arc<Self>,
        request: SeekRequest,
        cancel: &CancellationToken,
        cache: Option<StreamingCache>,
    ) -> SeekOutcome {
        let engine = self.engine.as_ref();
        let target = seconds_to_bytes(engine, request.target_seconds, self.config.end_margin);

        let Some(cache) = cache else {
            return self.commit(request.version, target, None);
        };

        if request.is_preview {
            let outcome = self.commit(request.version, target, Some(&cache));
            if outcome == SeekOutcome::Succeeded {
                self.spawn_settle(&cache, target, false);
            }
            return outcome;
        }

        let origin = engine.current_position_bytes();
        let distance = bytes_to_seconds(engine, target.abs_diff(origin));
        if distance <= self.config.short_jump_threshold.as_secs_f64() {
            trace!(version = request.version, distance, "short jump");
            let outcome = self.commit(request.version, target, Some(&cache));
            if outcome == SeekOutcome::Succeeded {
                self.spawn_settle(&cache, target, true);
            }
            return outcome;
        }

        self.long_seek(request.version, target, origin, cancel, &cache)
            .await
    }

    async fn long_seek(
        self: &Arc<Self>,
        version: u64,
        target: u64,
        origin: u64,
        cancel: &CancellationToken,
        cache: &StreamingCache,
    ) -> SeekOutcome {
        let engine = self.engine.as_ref();
        let context = PendingSeekContext {
            origin_bytes: origin,
            was_playing: engine.is_playing(),
            was_paused: engine.is_paused(),
            paused_for_deferral: false,
        };
        if self
            .with_live_op(version, |exec, _| exec.context = Some(context))
            .is_none()
        {
            return self.cancelled_outcome(version);
        }

        let boost = cancel.child_token();
        let _boost = boost.clone().drop_guard();
        cache.request_seek_boost(target, boost);
        let eta = cache.estimate_download_time(cache.config().chunk_size);
        debug!(version, target, origin, ?eta, "long seek waiting for cache");

        let watch_progress = context.was_playing && target > origin;
        let ready = tokio::select! {
            biased;
            () = cancel.cancelled() => return self.cancelled_outcome(version),
            () = self.natural_progress(target), if watch_progress => {
                return self.settle_natural(version);
            }
            ready = cache.wait_for_position_ready(target, self.config.long_wait, cancel) => ready,
        };
        if ready {
            return self.commit(version, target, Some(cache));
        }

        let deferred = self.with_live_op(version, |exec, engine| {
            if let Some(context) = exec.context.as_mut()
                && engine.is_playing()
            {
                engine.pause();
                context.paused_for_deferral = true;
            }
        });
        if deferred.is_none() {
            return self.cancelled_outcome(version);
        }
        info!(version, target, "long seek deferred, buffering");
        self.bus.publish(SeekEvent::Deferred { version });

        if cache
            .wait_for_position_ready(target, self.config.deferred_wait, cancel)
            .await
        {
            return self.commit(version, target, Some(cache));
        }

        let restored = self.with_live_op(version, |exec, engine| {
            if let Some(context) = exec.context.take() {
                engine.set_position(context.origin_bytes);
                restore_play_state(engine, &context);
            }
        });
        match restored {
            Some(()) => {
                warn!(version, target, origin, "long seek abandoned, origin restored");
                SeekOutcome::Failed
            }
            None => self.cancelled_outcome(version),
        }
    }

    /// Resolves once playback, left alone, has come within tolerance of
    /// `target`.
    async fn natural_progress(&self, target: u64) {
        let engine = self.engine.as_ref();
        let tolerance = seconds_to_bytes(
            engine,
            self.config.progress_tolerance.as_secs_f64(),
            Duration::ZERO,
        );
        let mut last = engine.current_position_bytes();
        loop {
            tokio::time::sleep(self.config.progress_poll).await;
            let position = engine.current_position_bytes();
            if position < last {
                trace!(position, last, "playback moved backwards");
            }
            last = position;
            if position.saturating_add(tolerance) >= target {
                debug!(position, target, "playback reached seek target");
                return;
            }
        }
    }

    fn settle_natural(&self, version: u64) -> SeekOutcome {
        match self.with_live_op(version, |exec, _| exec.context = None) {
            Some(()) => SeekOutcome::NaturalProgress,
            None => self.cancelled_outcome(version),
        }
    }

    /// Move the engine unless the op was cancelled. Resumes playback paused
    /// for deferral.
    fn commit(&self, version: u64, target: u64, cache: Option<&StreamingCache>) -> SeekOutcome {
        let fade_in = self.config.fade_in;
        let committed = self.with_live_op(version, |exec, engine| {
            let moved = engine.set_position(target);
            if moved {
                engine.apply_fade_in(fade_in);
            }
            if let Some(context) = exec.context.take()
                && context.paused_for_deferral
            {
                engine.resume();
            }
            moved
        });

        match committed {
            Some(true) => {
                if let Some(cache) = cache {
                    cache.update_playback_position(target);
                }
                SeekOutcome::Succeeded
            }
            Some(false) => {
                warn!(version, target, "engine rejected seek position");
                SeekOutcome::Failed
            }
            None => self.cancelled_outcome(version),
        }
    }

    /// Prefetch around a position the engine already moved to.
    fn spawn_settle(&self, cache: &StreamingCache, target: u64, boost: bool) {
        let token = self.cancel.child_token();
        if boost {
            cache.request_seek_boost(target, token.clone());
        }
        let prefetch = cache.prefetch_around(
            target,
            cache.config().min_ready_chunks,
            token.clone(),
            boost,
        );
        let wait = self.config.short_wait;
        self.runtime.spawn(async move {
            let _release = token.drop_guard();
            let ready = tokio::time::timeout(wait, prefetch)
                .await
                .unwrap_or(false);
            trace!(target, ready, "post-seek prefetch finished");
        });
    }

    // ---- bookkeeping ----------------------------------------------------

    /// Run `f` on the executing op `version` unless it has been cancelled.
    fn with_live_op<R>(
        &self,
        version: u64,
        f: impl FnOnce(&mut Executing, &dyn DecodeEngine) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock();
        match state.executing.as_mut() {
            Some(exec)
                if exec.version == version
                    && exec.reason.is_none()
                    && !exec.cancel.is_cancelled() =>
            {
                Some(f(exec, self.engine.as_ref()))
            }
            _ => None,
        }
    }

    fn cancelled_outcome(&self, version: u64) -> SeekOutcome {
        let state = self.state.lock();
        let reason = state
            .executing
            .as_ref()
            .filter(|exec| exec.version == version)
            .and_then(|exec| exec.reason);
        match reason {
            Some(CancelReason::Superseded) => SeekOutcome::SupersededBy {
                version: state.version,
            },
            Some(CancelReason::Restore) => SeekOutcome::Restored,
            Some(CancelReason::Abandon | CancelReason::Stop) | None => SeekOutcome::Abandoned,
        }
    }

    /// Signal the executing op and undo what its reason calls for. Runs
    /// under the state lock so the op cannot commit afterwards.
    fn cancel_executing(&self, exec: &mut Executing, reason: CancelReason) {
        if exec.reason.is_some() {
            return;
        }
        exec.reason = Some(reason);
        exec.cancel.cancel();

        let engine = self.engine.as_ref();
        if let Some(context) = exec.context.take() {
            match reason {
                CancelReason::Superseded => {
                    if context.paused_for_deferral {
                        engine.resume();
                    }
                }
                CancelReason::Restore => {
                    engine.set_position(context.origin_bytes);
                    restore_play_state(engine, &context);
                }
                CancelReason::Abandon => restore_play_state(engine, &context),
                CancelReason::Stop => {}
            }
        }
        debug!(version = exec.version, ?reason, "executing seek cancelled");
    }

    fn finish_op(&self, request: SeekRequest, outcome: SeekOutcome) {
        let version = request.version;
        let completion = {
            let mut state = self.state.lock();
            if state
                .executing
                .as_ref()
                .is_some_and(|exec| exec.version == version)
            {
                state.executing = None;
            }
            state.last_outcome = Some(outcome);
            if !outcome.is_superseded() {
                state.last_success = Some(outcome.is_success());
            }
            match outcome {
                SeekOutcome::Failed => {
                    state.consecutive_failures += 1;
                    if state.consecutive_failures >= self.config.failure_warn_limit {
                        warn!(
                            failures = state.consecutive_failures,
                            version, "seeks keep failing"
                        );
                    }
                }
                _ if outcome.is_success() => state.consecutive_failures = 0,
                _ => {}
            }
            self.take_completion(&mut state)
        };

        if outcome.is_superseded() {
            trace!(version, ?outcome, "superseded seek unwound");
        } else {
            let success = outcome.is_success();
            self.tracker.on_seek_executed(
                request.target_seconds,
                success,
                request.is_preview,
                version,
            );
            debug!(version, ?outcome, "seek executed");
            self.bus.publish(SeekEvent::Executed {
                target_seconds: request.target_seconds,
                success,
                is_preview: request.is_preview,
                version,
            });
        }
        if let Some(success) = completion {
            self.publish_completed(success);
        }
        self.refresh_idle(&self.state.lock());
        self.wake.notify_one();
    }

    fn refresh_idle(&self, state: &State) {
        let idle = state.pending.is_none() && state.executing.is_none();
        self.idle.send_if_modified(|current| {
            let changed = *current != idle;
            *current = idle;
            changed
        });
    }

    /// Consume a requested completion once nothing is left to run.
    fn take_completion(&self, state: &mut State) -> Option<bool> {
        if state.completion_requested && state.pending.is_none() && state.executing.is_none() {
            state.completion_requested = false;
            Some(state.last_success.unwrap_or(true))
        } else {
            None
        }
    }

    fn publish_completed(&self, success: bool) {
        debug!(success, "seek sequence completed");
        self.bus.publish(SeekEvent::Completed { success });
    }
}

fn restore_play_state(engine: &dyn DecodeEngine, context: &PendingSeekContext) {
    if context.was_playing {
        if !engine.is_playing() {
            engine.resume();
        }
    } else if context.was_paused && !engine.is_paused() {
        engine.pause();
    }
}

#[cfg(test)]
mod tests {
    use lyra_events::Event;
    use rstest::*;
    use tokio::sync::broadcast;

    use super::*;
    use crate::testing::TestEngine;

    const TOTAL: u64 = 1_000_000;
    const SECONDS: f64 = 100.0;

    struct Harness {
        engine: Arc<TestEngine>,
        seek: SeekCoordinator,
        events: broadcast::Receiver<Event>,
    }

    fn harness(config: SeekConfig) -> Harness {
        let engine = Arc::new(TestEngine::new(TOTAL, SECONDS));
        let bus = EventBus::default();
        let events = bus.subscribe();
        let seek = SeekCoordinator::new(engine.clone(), config, bus);
        Harness {
            engine,
            seek,
            events,
        }
    }

    #[fixture]
    fn config() -> SeekConfig {
        SeekConfig::new().with_debounce(Duration::from_millis(30))
    }

    fn seek_events(rx: &mut broadcast::Receiver<Event>) -> Vec<SeekEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::Seek(event) = event {
                out.push(event);
            }
        }
        out
    }

    fn executed_versions(events: &[SeekEvent]) -> Vec<u64> {
        events
            .iter()
            .filter_map(|e| match e {
                SeekEvent::Executed { version, .. } => Some(*version),
                _ => None,
            })
            .collect()
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn rapid_requests_execute_only_the_latest(config: SeekConfig) {
        let mut h = harness(config);

        let first = h.seek.request_seek(30.0, false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = h.seek.request_seek(45.0, false);
        h.seek.wait_idle().await;

        assert!(second > first);
        assert_eq!(h.engine.jumps(), vec![h.engine.bytes_for(45.0)]);
        let events = seek_events(&mut h.events);
        assert_eq!(executed_versions(&events), vec![second]);
        assert!(events.contains(&SeekEvent::Executed {
            target_seconds: 45.0,
            success: true,
            is_preview: false,
            version: second,
        }));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn burst_of_requests_yields_one_jump(config: SeekConfig) {
        let h = harness(config);

        for i in 0..20 {
            h.seek.request_seek(f64::from(i), true);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        h.seek.wait_idle().await;

        assert_eq!(h.engine.jumps(), vec![h.engine.bytes_for(19.0)]);
        assert_eq!(h.seek.latest_version(), 20);
        assert_eq!(h.seek.last_outcome(), Some(SeekOutcome::Succeeded));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn finish_seek_stops_the_debounce_timer() {
        let mut h = harness(SeekConfig::new().with_debounce(Duration::from_secs(10)));
        h.engine.place(h.engine.bytes_for(5.0));

        let version = h.seek.request_seek(20.0, false);
        assert!(h.seek.is_seeking());
        assert_eq!(
            h.seek.pending_request(),
            Some(SeekRequest {
                target_seconds: 20.0,
                origin_seconds: 5.0,
                is_preview: false,
                version,
            })
        );
        h.seek.finish_seek();

        assert!(!h.seek.is_seeking());
        assert_eq!(h.seek.pending_request(), None);
        let events = seek_events(&mut h.events);
        assert!(events.contains(&SeekEvent::Completed { success: true }));
        assert!(executed_versions(&events).is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.engine.jumps().is_empty());
        assert!(seek_events(&mut h.events).is_empty());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn finish_seek_when_idle_reports_the_last_result(config: SeekConfig) {
        let mut h = harness(config);
        h.engine.refuse_jumps(true);

        h.seek.request_seek(10.0, false);
        h.seek.wait_idle().await;
        h.seek.finish_seek();

        assert_eq!(h.seek.last_outcome(), Some(SeekOutcome::Failed));
        assert!(seek_events(&mut h.events).contains(&SeekEvent::Completed { success: false }));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn failure_counter_resets_on_success(config: SeekConfig) {
        let h = harness(config);
        h.engine.refuse_jumps(true);
        for target in [10.0, 20.0, 30.0] {
            h.seek.request_seek(target, false);
            h.seek.wait_idle().await;
        }
        assert_eq!(h.seek.consecutive_failures(), 3);

        h.engine.refuse_jumps(false);
        h.seek.request_seek(40.0, false);
        h.seek.wait_idle().await;

        assert_eq!(h.seek.consecutive_failures(), 0);
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn cancel_pending_seeks_drops_the_request(config: SeekConfig) {
        let h = harness(config);

        h.seek.request_seek(60.0, false);
        h.seek.cancel_pending_seeks();
        assert!(!h.seek.is_seeking());
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(h.engine.jumps().is_empty());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn successful_jump_fades_in(config: SeekConfig) {
        let h = harness(config);

        h.seek.request_seek(5.0, false);
        h.seek.wait_idle().await;

        assert_eq!(h.engine.fades(), 1);
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn targets_are_clamped_before_the_end(config: SeekConfig) {
        let h = harness(config);

        h.seek.request_seek(1_000.0, false);
        h.seek.wait_idle().await;

        let jump = h.engine.jumps()[0];
        assert!((999_000..TOTAL).contains(&jump));
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn display_position_follows_the_request(config: SeekConfig) {
        let mut h = harness(config);

        h.seek.request_seek(45.0, false);

        assert_eq!(h.seek.effective_position(), 45.0);
        let events = seek_events(&mut h.events);
        assert_eq!(
            events.first(),
            Some(&SeekEvent::Requested {
                target_seconds: 45.0,
                origin_seconds: 0.0,
                is_preview: false,
                version: 1,
            })
        );
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn restore_without_long_seek_is_a_no_op(config: SeekConfig) {
        let h = harness(config);

        h.seek.request_seek(45.0, false);

        assert!(!h.seek.cancel_pending_seek_and_restore());
        assert!(!h.seek.cancel_pending_long_seek());
        assert!(!h.seek.is_seeking());
    }

    #[rstest]
    #[timeout(Duration::from_secs(5))]
    #[tokio::test]
    async fn disposed_coordinator_ignores_requests(config: SeekConfig) {
        let h = harness(config);
        h.seek.dispose();

        let version = h.seek.request_seek(45.0, false);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(version, 0);
        assert!(h.engine.jumps().is_empty());
    }
}
