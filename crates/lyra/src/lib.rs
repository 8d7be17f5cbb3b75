#![forbid(unsafe_code)]

//! # Lyra
//!
//! Facade over the streaming playback core.
//!
//! ## Quick start
//!
//! ```ignore
//! use lyra::prelude::*;
//!
//! let config = LyraConfig::default();
//! let net = config.http_client()?;
//! let bus = EventBus::default();
//!
//! let session = Session::open(&catalog, "track-42", &config, net, bus.clone()).await?;
//! let reader = session.reader(); // hand to the decoder thread
//!
//! let seek = Arc::new(SeekCoordinator::new(engine, config.seek.clone(), bus));
//! let slot = SessionSlot::new(config.grace_period).with_seek(seek.clone());
//! slot.switch_to(session);
//! seek.request_seek(42.0, false);
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod cache {
    pub use lyra_cache::*;
}

pub mod events {
    pub use lyra_events::*;
}

pub mod net {
    pub use lyra_net::*;
}

pub mod seek {
    pub use lyra_seek::*;
}

// ── Sessions ────────────────────────────────────────────────────────────

mod catalog;
mod config;
mod error;
mod session;
mod slot;

pub use catalog::{Catalog, StaticCatalog, TrackSource};
pub use config::LyraConfig;
pub use error::{LyraError, LyraResult};
pub use session::Session;
pub use slot::SessionSlot;

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use lyra_cache::{BufferingState, CacheConfig, CacheReader, StreamingCache};
    pub use lyra_events::{Event, EventBus};
    pub use lyra_net::{Net, NetOptions};
    pub use lyra_seek::{DecodeEngine, SeekConfig, SeekCoordinator, SeekOutcome};

    pub use crate::{
        Catalog, LyraConfig, LyraError, LyraResult, Session, SessionSlot, TrackSource,
    };
}
