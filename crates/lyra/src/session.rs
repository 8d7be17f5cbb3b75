use std::sync::Arc;

use lyra_cache::{CacheReader, Resource, StreamingCache};
use lyra_events::{Event, EventBus};
use lyra_net::Net;
use tokio::sync::broadcast;
use tracing::info;

use crate::{catalog::Catalog, config::LyraConfig, error::LyraResult};

/// One track being played: its resolved source and the cache behind it.
///
/// Dropping the last handle to the cache stops its downloads; use
/// [`SessionSlot`](crate::SessionSlot) to switch tracks without cutting off
/// a decoder mid-read.
#[derive(Debug)]
pub struct Session {
    track_id: String,
    cache: StreamingCache,
    bus: EventBus,
}

impl Session {
    /// Resolve `track_id` and open a streaming cache for it.
    ///
    /// # Errors
    ///
    /// A catalog error, or a cache error when the resource is unreachable
    /// or has no usable size.
    pub async fn open(
        catalog: &dyn Catalog,
        track_id: &str,
        config: &LyraConfig,
        net: Arc<dyn Net>,
        bus: EventBus,
    ) -> LyraResult<Self> {
        let source = catalog.resolve(track_id).await?;
        let mut resource = Resource::new(track_id, source.url);
        if let Some(total_size) = source.total_size {
            resource = resource.with_total_size(total_size);
        }

        let cache =
            StreamingCache::initialize(resource, config.cache.clone(), net, bus.clone()).await?;
        info!(track = track_id, total_size = cache.total_size(), "session opened");
        Ok(Self {
            track_id: track_id.to_owned(),
            cache,
            bus,
        })
    }

    #[must_use]
    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    #[must_use]
    pub fn cache(&self) -> &StreamingCache {
        &self.cache
    }

    /// Blocking reader for the decoder.
    #[must_use]
    pub fn reader(&self) -> CacheReader {
        self.cache.reader()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn dispose(&self) {
        self.cache.dispose();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.cache.is_disposed()
    }
}
