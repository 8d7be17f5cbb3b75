#![forbid(unsafe_code)]

//! Events surfaced by the streaming cache and the seek coordinator.

mod bus;
mod cache;
mod event;
mod seek;

pub use bus::EventBus;
pub use cache::{BufferingState, CacheEvent};
pub use event::Event;
pub use seek::SeekEvent;
