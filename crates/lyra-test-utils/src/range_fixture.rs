//! A single-file HTTP origin that honours `Range` and can misbehave on demand.

use std::{
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Response, StatusCode, header},
    routing::get,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{TestHttpServer, rng::pattern_bytes};

pub const TRACK_PATH: &str = "/track.bin";

struct FixtureState {
    data: Bytes,
    delay: Mutex<Duration>,
    gate: watch::Sender<bool>,
    fail_next: AtomicU32,
    unreachable: AtomicBool,
    head_enabled: AtomicBool,
    requests: Mutex<Vec<Range<u64>>>,
}

/// Deterministic origin for one track served at [`TRACK_PATH`].
#[derive(Clone)]
pub struct RangeFixture {
    state: Arc<FixtureState>,
}

impl RangeFixture {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(FixtureState {
                data: data.into(),
                delay: Mutex::new(Duration::ZERO),
                gate,
                fail_next: AtomicU32::new(0),
                unreachable: AtomicBool::new(false),
                head_enabled: AtomicBool::new(true),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Pseudo-random payload of `len` bytes.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self::new(pattern_bytes(len, 0x5eed))
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.state.data
    }

    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route(TRACK_PATH, get(serve_get).head(serve_head))
            .with_state(self.state.clone())
    }

    /// Start a server for this fixture.
    pub async fn serve(&self) -> TestHttpServer {
        TestHttpServer::new(self.router()).await
    }

    /// Delay every range response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    /// Stall range responses until [`release`](Self::release).
    pub fn hold(&self) {
        self.state.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.state.gate.send_replace(true);
    }

    /// Answer the next `n` range requests with 500.
    pub fn fail_next(&self, n: u32) {
        self.state.fail_next.store(n, Ordering::SeqCst);
    }

    /// Answer every request with 503 while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Reply 405 to HEAD, forcing a range probe.
    pub fn disable_head(&self) {
        self.state.head_enabled.store(false, Ordering::SeqCst);
    }

    /// Ranges requested so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<Range<u64>> {
        self.state.requests.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }
}

fn parse_range(value: &str, len: u64) -> Option<Range<u64>> {
    let spec = value.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => len.checked_sub(1)?,
        end => end.parse::<u64>().ok()?.min(len.checked_sub(1)?),
    };
    (start <= end).then_some(start..end + 1)
}

fn status_only(status: StatusCode) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::empty())
        .expect("build response")
}

async fn serve_get(State(state): State<Arc<FixtureState>>, headers: HeaderMap) -> Response<Body> {
    if state.unreachable.load(Ordering::SeqCst) {
        return status_only(StatusCode::SERVICE_UNAVAILABLE);
    }

    let len = state.data.len() as u64;
    let Some(range_header) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, len)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from(state.data.clone()))
            .expect("build response");
    };

    let Some(range) = parse_range(range_header, len) else {
        return Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{len}"))
            .body(Body::empty())
            .expect("build response");
    };
    state.requests.lock().push(range.clone());

    let mut gate = state.gate.subscribe();
    let _ = gate.wait_for(|open| *open).await;
    let delay = *state.delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    if state
        .fail_next
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return status_only(StatusCode::INTERNAL_SERVER_ERROR);
    }

    let body = state.data.slice(range.start as usize..range.end as usize);
    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_LENGTH, body.len())
        .header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{len}", range.start, range.end - 1),
        )
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from(body))
        .expect("build response")
}

async fn serve_head(State(state): State<Arc<FixtureState>>) -> Response<Body> {
    if state.unreachable.load(Ordering::SeqCst) {
        return status_only(StatusCode::SERVICE_UNAVAILABLE);
    }
    if !state.head_enabled.load(Ordering::SeqCst) {
        return status_only(StatusCode::METHOD_NOT_ALLOWED);
    }
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, state.data.len())
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::empty())
        .expect("build response")
}
