use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use crate::error::{LyraError, LyraResult};

/// Where a track's audio lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackSource {
    pub url: Url,
    /// `None` when the catalog does not know; the cache probes it.
    pub total_size: Option<u64>,
}

/// Resolves track ids to downloadable sources, once per session.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// # Errors
    ///
    /// [`LyraError::Catalog`] when the track is unknown or unavailable.
    async fn resolve(&self, track_id: &str) -> LyraResult<TrackSource>;
}

/// Catalog backed by a fixed map. Handy for local files served over HTTP
/// and for tests.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    tracks: RwLock<HashMap<String, TrackSource>>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_track(self, track_id: impl Into<String>, source: TrackSource) -> Self {
        self.insert(track_id, source);
        self
    }

    pub fn insert(&self, track_id: impl Into<String>, source: TrackSource) {
        self.tracks.write().insert(track_id.into(), source);
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn resolve(&self, track_id: &str) -> LyraResult<TrackSource> {
        self.tracks
            .read()
            .get(track_id)
            .cloned()
            .ok_or_else(|| LyraError::Catalog {
                track_id: track_id.to_owned(),
                reason: "unknown track".to_owned(),
            })
    }
}
