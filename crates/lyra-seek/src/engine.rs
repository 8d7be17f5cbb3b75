use std::time::Duration;

#[cfg(test)]
use unimock::unimock;

/// Playback engine the coordinator drives.
///
/// Positions are byte offsets in the same space as the streaming cache.
/// Implementations must not call back into the coordinator; it holds its
/// state lock while restoring or committing a position.
#[cfg_attr(test, unimock(api = DecodeEngineMock))]
pub trait DecodeEngine: Send + Sync {
    fn current_position_bytes(&self) -> u64;

    fn duration_bytes(&self) -> u64;

    fn duration_seconds(&self) -> f64;

    /// Move playback to `byte_offset`. Returns false if the engine refused.
    fn set_position(&self, byte_offset: u64) -> bool;

    fn pause(&self);

    fn resume(&self);

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;

    /// Ramp volume up over `duration` to hide the discontinuity of a jump.
    fn apply_fade_in(&self, duration: Duration);
}

/// Byte offset of `seconds`, clamped to `[0, duration - end_margin]` and
/// inside the stream.
pub(crate) fn seconds_to_bytes(engine: &dyn DecodeEngine, seconds: f64, end_margin: Duration) -> u64 {
    let total_bytes = engine.duration_bytes();
    let duration = engine.duration_seconds();
    if total_bytes == 0 || duration <= 0.0 {
        return 0;
    }
    let limit = (duration - end_margin.as_secs_f64()).max(0.0);
    let seconds = seconds.clamp(0.0, limit);
    let bytes = (seconds * total_bytes as f64 / duration) as u64;
    bytes.min(total_bytes - 1)
}

/// Playback time covered by `bytes`.
pub(crate) fn bytes_to_seconds(engine: &dyn DecodeEngine, bytes: u64) -> f64 {
    let total_bytes = engine.duration_bytes();
    if total_bytes == 0 {
        return 0.0;
    }
    bytes as f64 * engine.duration_seconds() / total_bytes as f64
}
