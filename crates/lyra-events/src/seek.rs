/// Events from the seek coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum SeekEvent {
    /// A seek request was accepted.
    Requested {
        target_seconds: f64,
        origin_seconds: f64,
        is_preview: bool,
        version: u64,
    },
    /// An executing seek resolved. Superseded seeks are not reported.
    Executed {
        target_seconds: f64,
        success: bool,
        is_preview: bool,
        version: u64,
    },
    /// A long seek ran out of time and switched to deferred buffering.
    Deferred { version: u64 },
    /// The seek sequence finished after `finish_seek`.
    Completed { success: bool },
}
