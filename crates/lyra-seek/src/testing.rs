//! In-memory [`DecodeEngine`] for tests.

use std::time::Duration;

use parking_lot::Mutex;

use crate::DecodeEngine;

#[derive(Debug, Default)]
struct EngineState {
    position: u64,
    playing: bool,
    paused: bool,
    refuse: bool,
    jumps: Vec<u64>,
    fades: Vec<Duration>,
}

/// Engine with a fixed duration whose position moves only when told to.
///
/// `set_position` calls are recorded as jumps; [`advance`](Self::advance)
/// simulates ordinary playback.
#[derive(Debug)]
pub struct TestEngine {
    duration_bytes: u64,
    duration_seconds: f64,
    state: Mutex<EngineState>,
}

impl TestEngine {
    #[must_use]
    pub fn new(duration_bytes: u64, duration_seconds: f64) -> Self {
        Self {
            duration_bytes,
            duration_seconds,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Start playing from the current position.
    pub fn play(&self) {
        let mut state = self.state.lock();
        state.playing = true;
        state.paused = false;
    }

    /// Move the position without recording a jump.
    pub fn place(&self, byte_offset: u64) {
        self.state.lock().position = byte_offset.min(self.duration_bytes);
    }

    /// Natural playback progress.
    pub fn advance(&self, bytes: u64) {
        let mut state = self.state.lock();
        state.position = state.position.saturating_add(bytes).min(self.duration_bytes);
    }

    /// Make `set_position` fail while set.
    pub fn refuse_jumps(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.state.lock().position
    }

    #[must_use]
    pub fn jumps(&self) -> Vec<u64> {
        self.state.lock().jumps.clone()
    }

    #[must_use]
    pub fn fades(&self) -> usize {
        self.state.lock().fades.len()
    }

    #[must_use]
    pub fn bytes_for(&self, seconds: f64) -> u64 {
        (seconds * self.duration_bytes as f64 / self.duration_seconds) as u64
    }
}

impl DecodeEngine for TestEngine {
    fn current_position_bytes(&self) -> u64 {
        self.position()
    }

    fn duration_bytes(&self) -> u64 {
        self.duration_bytes
    }

    fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    fn set_position(&self, byte_offset: u64) -> bool {
        let mut state = self.state.lock();
        if state.refuse {
            return false;
        }
        state.position = byte_offset;
        state.jumps.push(byte_offset);
        true
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.paused = true;
    }

    fn resume(&self) {
        self.play();
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn apply_fade_in(&self, duration: Duration) {
        self.state.lock().fades.push(duration);
    }
}
