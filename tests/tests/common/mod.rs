//! A player assembled from real parts: fixture origin, session, cache and
//! seek coordinator, with [`TestEngine`] standing in for the decoder.

use std::{sync::Arc, time::Duration};

use lyra::{
    LyraConfig, Session, SessionSlot, StaticCatalog, TrackSource,
    cache::{CacheConfig, StreamingCache},
    events::{Event, EventBus, SeekEvent},
    net::{HttpClient, Net, NetExt, NetOptions, RetryPolicy},
    seek::{SeekConfig, SeekCoordinator, TestEngine},
};
use lyra_test_utils::{RangeFixture, TRACK_PATH, TestHttpServer, init_tracing};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const CHUNK: u64 = 16 * 1024;
pub const LEN: usize = 64 * CHUNK as usize;
pub const DURATION_SECONDS: f64 = 100.0;

pub struct Player {
    pub fixture: RangeFixture,
    _server: TestHttpServer,
    pub engine: Arc<TestEngine>,
    pub seek: Arc<SeekCoordinator>,
    pub slot: SessionSlot,
    pub events: broadcast::Receiver<Event>,
}

fn net() -> Arc<dyn Net> {
    let options = NetOptions::default().with_retry_policy(RetryPolicy::new(
        0,
        Duration::from_millis(5),
        Duration::from_millis(20),
    ));
    let http = HttpClient::new(options.clone()).unwrap();
    Arc::new(
        http.with_timeout(options.request_timeout)
            .with_retry(options.retry_policy),
    )
}

/// Fetches only what is asked for: a short lookahead, no background fill.
pub fn cache_config() -> CacheConfig {
    CacheConfig::new()
        .with_chunk_size(CHUNK)
        .with_lookahead(2, 2)
        .with_behind_chunks(0)
        .with_seek_boost_window(1)
        .with_min_ready_chunks(2)
        .with_concurrency(2, 1)
        .with_poll_interval(Duration::from_millis(20))
        .with_ready_timeout(Duration::from_secs(5))
        .with_read_timeout(Duration::from_secs(5))
        .with_max_resident_bytes(Some(u64::MAX))
}

/// Fast timings; long waits are set per test.
pub fn seek_config() -> SeekConfig {
    SeekConfig::new()
        .with_debounce(Duration::from_millis(20))
        .with_progress_monitor(Duration::from_millis(20), Duration::from_millis(250))
        .with_long_waits(Duration::from_millis(200), Duration::from_secs(5))
}

impl Player {
    pub async fn open(seek_config: SeekConfig) -> Self {
        init_tracing();
        let fixture = RangeFixture::with_len(LEN);
        let server = fixture.serve().await;
        let catalog = StaticCatalog::new().with_track(
            "track",
            TrackSource {
                url: server.url(TRACK_PATH),
                total_size: Some(LEN as u64),
            },
        );
        let config = LyraConfig::new()
            .with_cache(cache_config())
            .with_seek(seek_config)
            .with_grace_period(Duration::ZERO);

        let bus = EventBus::default();
        let events = bus.subscribe();
        let session = Session::open(&catalog, "track", &config, net(), bus.clone())
            .await
            .unwrap();
        let engine = Arc::new(TestEngine::new(LEN as u64, DURATION_SECONDS));
        let seek = Arc::new(SeekCoordinator::new(
            engine.clone(),
            config.seek.clone(),
            bus,
        ));
        let slot = SessionSlot::new(config.grace_period).with_seek(seek.clone());
        slot.switch_to(session);

        let player = Self {
            fixture,
            _server: server,
            engine,
            seek,
            slot,
            events,
        };
        let cache = player.cache();
        assert!(
            cache
                .wait_for_cache_ready(0, false, &CancellationToken::new())
                .await
        );
        eventually(|| cache.are_chunks_ready(0, 3)).await;
        player
    }

    pub fn cache(&self) -> StreamingCache {
        self.slot.current().unwrap().cache().clone()
    }

    pub fn bytes_for(&self, seconds: f64) -> u64 {
        self.engine.bytes_for(seconds)
    }

    /// Seek events published so far and not yet drained.
    pub fn seek_events(&mut self) -> Vec<SeekEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            if let Event::Seek(event) = event {
                out.push(event);
            }
        }
        out
    }
}

pub fn executed(events: &[SeekEvent]) -> Vec<(u64, bool)> {
    events
        .iter()
        .filter_map(|event| match event {
            SeekEvent::Executed {
                version, success, ..
            } => Some((*version, *success)),
            _ => None,
        })
        .collect()
}

pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..250 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}
