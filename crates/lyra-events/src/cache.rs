use std::fmt;

/// Coarse buffering state of a streaming cache, for UI feedback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BufferingState {
    /// Nothing requested yet.
    #[default]
    Idle = 0,
    /// Pre-roll: waiting for the initial buffer.
    Buffering = 1,
    /// Enough data ahead of the cursor, playback not started.
    Ready = 2,
    /// Playing with enough data ahead.
    Playing = 3,
    /// Playing, but the data ahead of the cursor fell below the minimum.
    LowBuffer = 4,
}

impl BufferingState {
    /// True while playback is (or would be) stalled on data.
    #[must_use]
    pub fn is_stalled(self) -> bool {
        matches!(self, Self::Buffering | Self::LowBuffer)
    }

    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Buffering,
            2 => Self::Ready,
            3 => Self::Playing,
            4 => Self::LowBuffer,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for BufferingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Buffering => "buffering",
            Self::Ready => "ready",
            Self::Playing => "playing",
            Self::LowBuffer => "low-buffer",
        };
        f.write_str(name)
    }
}

/// Events from the streaming cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheEvent {
    /// The cache moved between buffered and stalled states.
    BufferingStateChanged { state: BufferingState },
    /// A chunk was downloaded and is readable.
    ChunkReady {
        index: usize,
        cached_bytes: u64,
        total_bytes: u64,
    },
    /// A chunk fetch failed and will be retried.
    ChunkFailed { index: usize, attempts: u32 },
    /// A chunk exhausted its retries; readers blocked on it fail.
    ChunkUnavailable { index: usize },
    /// Every chunk is resident.
    FullyCached { total_bytes: u64 },
}
