use std::{sync::Arc, time::Duration};

use lyra_seek::SeekCoordinator;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::session::Session;

#[derive(Default)]
struct SlotState {
    generation: u64,
    current: Option<Arc<Session>>,
}

/// Owns the session currently playing.
///
/// Every switch bumps a generation. The replaced session keeps running for
/// the grace period so a decoder still reading from it can finish, then it
/// is disposed.
pub struct SessionSlot {
    state: Mutex<SlotState>,
    grace_period: Duration,
    seek: Option<Arc<SeekCoordinator>>,
    cancel: CancellationToken,
}

impl SessionSlot {
    #[must_use]
    pub fn new(grace_period: Duration) -> Self {
        Self {
            state: Mutex::new(SlotState::default()),
            grace_period,
            seek: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Keep `seek` pointed at the current session's cache.
    #[must_use]
    pub fn with_seek(mut self, seek: Arc<SeekCoordinator>) -> Self {
        self.seek = Some(seek);
        self
    }

    /// Install `session` as current and retire the previous one. Returns the
    /// new generation.
    pub fn switch_to(&self, session: Session) -> u64 {
        let session = Arc::new(session);
        let (generation, previous) = {
            let mut state = self.state.lock();
            state.generation += 1;
            (state.generation, state.current.replace(Arc::clone(&session)))
        };

        if let Some(seek) = &self.seek {
            seek.cancel_pending_seeks();
            seek.tracker().reset_for_track(Some(session.track_id()));
            seek.set_cache(Some(session.cache().clone()));
        }
        info!(generation, track = session.track_id(), "session switched");

        if let Some(previous) = previous {
            self.retire(previous);
        }
        generation
    }

    /// Retire the current session without a replacement.
    pub fn clear(&self) {
        let previous = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.current.take()
        };
        if let Some(seek) = &self.seek {
            seek.cancel_pending_seeks();
            seek.tracker().reset_for_track(None);
            seek.set_cache(None);
        }
        if let Some(previous) = previous {
            self.retire(previous);
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<Arc<Session>> {
        self.state.lock().current.clone()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Whether work started under `generation` still belongs to the current
    /// session.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Dispose the current session and every retiring one immediately.
    pub fn dispose(&self) {
        self.cancel.cancel();
        let current = self.state.lock().current.take();
        if let Some(session) = current {
            session.dispose();
        }
        if let Some(seek) = &self.seek {
            seek.set_cache(None);
        }
    }

    fn retire(&self, session: Arc<Session>) {
        let grace = self.grace_period;
        if grace.is_zero() || self.cancel.is_cancelled() {
            session.dispose();
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            session.dispose();
            return;
        };

        let cancel = self.cancel.clone();
        debug!(track = session.track_id(), ?grace, "session retiring");
        runtime.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(grace) => {}
            }
            session.dispose();
            debug!(track = session.track_id(), "retired session disposed");
        });
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.dispose();
    }
}
