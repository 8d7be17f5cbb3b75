#![forbid(unsafe_code)]

//! `lyra-cache`
//!
//! Lets a decoder read a remote file as if it were local while only part of
//! it has been downloaded.
//!
//! - [`StreamingCache`] owns the chunk table and a background download
//!   scheduler, and offers readiness probes, async waits and seek boosts.
//! - [`CacheReader`] is the blocking `Read + Seek` view handed to the decoder.

mod cache;
mod config;
mod error;
mod priority;
mod reader;
mod resource;
mod scheduler;
mod throughput;

pub use cache::{CacheHealth, StreamingCache};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use lyra_events::BufferingState;
pub use lyra_storage::{ChunkLayout, ChunkState};
pub use reader::CacheReader;
pub use resource::Resource;
