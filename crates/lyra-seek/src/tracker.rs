//! UI-facing playback position while seeks are in flight.
//!
//! Right after a seek is requested or executed the engine may still report
//! its old position, or a transient zero. For a short window the tracker
//! extrapolates from the seek target instead.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const REQUEST_WINDOW: Duration = Duration::from_millis(1200);
const PREVIEW_WINDOW: Duration = Duration::from_millis(350);
const EXECUTE_WINDOW: Duration = Duration::from_millis(1500);
/// Engine readings further than this from the extrapolated target are distrusted.
const ENGINE_JUMP_GUARD: f64 = 6.0;
const END_MARGIN: f64 = 0.05;

#[derive(Clone, Copy, Debug)]
struct Mark {
    target: f64,
    at: Instant,
    is_preview: bool,
    version: u64,
}

#[derive(Debug, Default)]
struct TrackerState {
    track_id: Option<String>,
    requested: Option<Mark>,
    /// Last successful execution.
    executed: Option<Mark>,
}

#[derive(Debug, Default)]
pub struct PositionTracker {
    state: Mutex<TrackerState>,
}

impl PositionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all marks unless `track_id` is the track already tracked.
    pub fn reset_for_track(&self, track_id: Option<&str>) {
        let mut state = self.state.lock();
        if state.track_id.is_some() && state.track_id.as_deref() == track_id {
            return;
        }
        *state = TrackerState {
            track_id: track_id.map(str::to_owned),
            ..TrackerState::default()
        };
    }

    pub fn on_seek_requested(&self, target_seconds: f64, is_preview: bool, version: u64) {
        self.state.lock().requested = Some(Mark {
            target: target_seconds,
            at: Instant::now(),
            is_preview,
            version,
        });
    }

    pub fn on_seek_executed(&self, target_seconds: f64, success: bool, is_preview: bool, version: u64) {
        if success {
            self.state.lock().executed = Some(Mark {
                target: target_seconds,
                at: Instant::now(),
                is_preview,
                version,
            });
        }
    }

    /// Version of the last request seen, if any.
    #[must_use]
    pub fn last_requested_version(&self) -> Option<u64> {
        self.state.lock().requested.map(|mark| mark.version)
    }

    /// Position a relative seek (e.g. "+10 s") should start from.
    ///
    /// With `prefer_target` the last requested target wins regardless of age.
    #[must_use]
    pub fn seek_base_position(
        &self,
        engine_position: f64,
        duration: f64,
        is_playing: bool,
        prefer_target: bool,
    ) -> f64 {
        self.seek_base_position_at(Instant::now(), engine_position, duration, is_playing, prefer_target)
    }

    /// Position to show: the engine's, unless a recent seek makes it suspect.
    #[must_use]
    pub fn effective_position(&self, engine_position: f64, duration: f64, is_playing: bool) -> f64 {
        self.effective_position_at(Instant::now(), engine_position, duration, is_playing)
    }

    fn seek_base_position_at(
        &self,
        now: Instant,
        engine_position: f64,
        duration: f64,
        is_playing: bool,
        prefer_target: bool,
    ) -> f64 {
        let state = self.state.lock();
        let base = match (state.requested, state.recent_execute(now)) {
            (Some(req), _) if prefer_target || is_recent_request(&req, now) => {
                extrapolate(&req, now, is_playing)
            }
            (_, Some(exec)) => extrapolate(&exec, now, is_playing),
            _ => engine_position,
        };
        clamp(base, duration)
    }

    fn effective_position_at(
        &self,
        now: Instant,
        engine_position: f64,
        duration: f64,
        is_playing: bool,
    ) -> f64 {
        let state = self.state.lock();
        let recent = state
            .requested
            .filter(|req| is_recent_request(req, now))
            .or_else(|| state.recent_execute(now));

        let position = match recent {
            Some(mark) => {
                let base = extrapolate(&mark, now, is_playing);
                if engine_unstable(engine_position, base) { base } else { engine_position }
            }
            None => engine_position,
        };
        clamp(position, duration)
    }
}

impl TrackerState {
    fn recent_execute(&self, now: Instant) -> Option<Mark> {
        self.executed
            .filter(|mark| now.saturating_duration_since(mark.at) <= EXECUTE_WINDOW)
    }
}

fn is_recent_request(mark: &Mark, now: Instant) -> bool {
    let window = if mark.is_preview { PREVIEW_WINDOW } else { REQUEST_WINDOW };
    now.saturating_duration_since(mark.at) <= window
}

fn extrapolate(mark: &Mark, now: Instant, is_playing: bool) -> f64 {
    if is_playing {
        mark.target + now.saturating_duration_since(mark.at).as_secs_f64()
    } else {
        mark.target
    }
}

fn engine_unstable(engine_position: f64, base: f64) -> bool {
    engine_position <= 0.0 || base <= 0.0 || (engine_position - base).abs() >= ENGINE_JUMP_GUARD
}

fn clamp(position: f64, duration: f64) -> f64 {
    if duration <= 0.0 {
        return position.max(0.0);
    }
    position.clamp(0.0, (duration - END_MARGIN).max(0.0))
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[fixture]
    fn tracker() -> PositionTracker {
        PositionTracker::new()
    }

    #[rstest]
    fn engine_position_is_used_without_recent_seeks(tracker: PositionTracker) {
        assert_eq!(tracker.effective_position(12.5, 200.0, true), 12.5);
    }

    #[rstest]
    fn stale_engine_reading_is_replaced_by_target(tracker: PositionTracker) {
        tracker.on_seek_requested(90.0, false, 1);
        let now = Instant::now();

        let position = tracker.effective_position_at(now, 10.0, 200.0, false);

        assert_eq!(position, 90.0);
    }

    #[rstest]
    fn close_engine_reading_is_trusted(tracker: PositionTracker) {
        tracker.on_seek_requested(90.0, false, 1);

        let position = tracker.effective_position_at(Instant::now(), 91.0, 200.0, false);

        assert_eq!(position, 91.0);
    }

    #[rstest]
    fn zero_engine_reading_is_replaced(tracker: PositionTracker) {
        tracker.on_seek_requested(30.0, false, 1);
        assert_eq!(tracker.effective_position(0.0, 200.0, false), 30.0);
    }

    #[rstest]
    #[case::request(false, Duration::from_millis(1100), 90.0)]
    #[case::request_expired(false, Duration::from_millis(1300), 10.0)]
    #[case::preview(true, Duration::from_millis(300), 90.0)]
    #[case::preview_expired(true, Duration::from_millis(400), 10.0)]
    fn request_window_depends_on_preview(
        tracker: PositionTracker,
        #[case] is_preview: bool,
        #[case] elapsed: Duration,
        #[case] expected: f64,
    ) {
        tracker.on_seek_requested(90.0, is_preview, 1);
        let at = tracker.state.lock().requested.unwrap().at;

        let position = tracker.effective_position_at(at + elapsed, 10.0, 200.0, false);

        assert_eq!(position, expected);
    }

    #[rstest]
    fn executed_target_extrapolates_while_playing(tracker: PositionTracker) {
        tracker.on_seek_executed(50.0, true, false, 3);
        let at = tracker.state.lock().executed.unwrap().at;

        let position = tracker.effective_position_at(at + Duration::from_secs(1), 1.0, 200.0, true);

        assert!((position - 51.0).abs() < 1e-9);
    }

    #[rstest]
    fn failed_execution_is_ignored(tracker: PositionTracker) {
        tracker.on_seek_executed(50.0, false, false, 3);
        assert_eq!(tracker.effective_position(1.0, 200.0, true), 1.0);
    }

    #[rstest]
    fn positions_are_clamped_before_the_end(tracker: PositionTracker) {
        tracker.on_seek_requested(500.0, false, 1);
        assert!((tracker.effective_position(0.0, 200.0, false) - 199.95).abs() < 1e-9);
        assert_eq!(PositionTracker::new().effective_position(-4.0, 0.0, false), 0.0);
    }

    #[rstest]
    fn seek_base_prefers_target_when_asked(tracker: PositionTracker) {
        tracker.on_seek_requested(70.0, false, 1);
        let at = tracker.state.lock().requested.unwrap().at;
        let later = at + Duration::from_secs(5);

        assert_eq!(tracker.seek_base_position_at(later, 20.0, 200.0, false, false), 20.0);
        assert_eq!(tracker.seek_base_position_at(later, 20.0, 200.0, false, true), 70.0);
    }

    #[rstest]
    fn reset_keeps_marks_for_the_same_track(tracker: PositionTracker) {
        tracker.reset_for_track(Some("a"));
        tracker.on_seek_requested(70.0, false, 4);

        tracker.reset_for_track(Some("a"));
        assert_eq!(tracker.last_requested_version(), Some(4));

        tracker.reset_for_track(Some("b"));
        assert_eq!(tracker.last_requested_version(), None);
    }
}
