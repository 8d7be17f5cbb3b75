#![forbid(unsafe_code)]

//! `lyra-seek`
//!
//! Coordinates seeks between a UI that emits them in bursts and a decode
//! engine that should only jump once per gesture.
//!
//! - [`SeekCoordinator`] debounces requests, keeps the latest one and picks
//!   a strategy depending on the jump distance and what the
//!   [`StreamingCache`](lyra_cache::StreamingCache) already holds.
//! - [`PositionTracker`] keeps the displayed position steady while a seek is
//!   in flight.

mod config;
mod coordinator;
mod engine;
mod outcome;
#[cfg(any(test, feature = "test-utils"))]
mod testing;
mod tracker;

pub use config::SeekConfig;
pub use coordinator::{SeekCoordinator, SeekRequest};
pub use engine::DecodeEngine;
pub use outcome::SeekOutcome;
#[cfg(any(test, feature = "test-utils"))]
pub use testing::TestEngine;
pub use tracker::PositionTracker;
