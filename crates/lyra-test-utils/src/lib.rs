#![forbid(unsafe_code)]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "test utility crate, panics are the failure mode"
)]

//! Shared test utilities for the lyra workspace.

pub mod http_server;
pub mod range_fixture;
pub mod rng;

pub use http_server::TestHttpServer;
pub use range_fixture::{RangeFixture, TRACK_PATH};
pub use rng::{Xorshift64, pattern_bytes};

/// Install a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
