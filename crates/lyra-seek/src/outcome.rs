/// How an executing seek resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The engine moved to the target.
    Succeeded,
    /// The engine refused the target, or the long path gave up and restored the origin.
    Failed,
    /// A newer request replaced this one; nothing is reported for it.
    SupersededBy { version: u64 },
    /// Playback reached the target on its own before the jump was needed.
    NaturalProgress,
    /// Cancelled by the caller, origin position and play state restored.
    Restored,
    /// Cancelled without a replacement.
    Abandoned,
}

impl SeekOutcome {
    /// Whether playback ended up at the requested target.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::NaturalProgress)
    }

    #[must_use]
    pub fn is_superseded(self) -> bool {
        matches!(self, Self::SupersededBy { .. })
    }
}
