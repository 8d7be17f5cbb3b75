#![forbid(unsafe_code)]

//! `lyra-storage`
//!
//! Fixed-size chunk table over a remote resource's byte space:
//! - [`ChunkLayout`] maps offsets to chunk indices
//! - [`ChunkStore`] tracks chunk states and owns the payloads
//! - [`CacheDir`] writes fully downloaded resources through to disk

mod error;
mod layout;
mod persist;
mod store;

pub use error::{StorageError, StorageResult};
pub use layout::ChunkLayout;
pub use persist::CacheDir;
pub use store::{ChunkState, ChunkStore, FailOutcome, WaitOutcome};
