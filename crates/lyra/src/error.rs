use lyra_cache::CacheError;
use lyra_net::NetError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LyraError {
    /// The catalog could not resolve a track.
    #[error("track {track_id} not resolvable: {reason}")]
    Catalog { track_id: String, reason: String },

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("network error: {0}")]
    Net(#[from] NetError),
}

pub type LyraResult<T> = Result<T, LyraError>;
