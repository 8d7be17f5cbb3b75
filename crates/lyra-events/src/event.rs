use crate::{CacheEvent, SeekEvent};

/// Unified event, one variant per subsystem.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Cache(CacheEvent),
    Seek(SeekEvent),
}

impl From<CacheEvent> for Event {
    fn from(e: CacheEvent) -> Self {
        Self::Cache(e)
    }
}

impl From<SeekEvent> for Event {
    fn from(e: SeekEvent) -> Self {
        Self::Seek(e)
    }
}
