use lyra_net::NetError;
use lyra_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The resource could not be probed or reached at open.
    #[error("resource {id} unavailable: {source}")]
    ResourceUnavailable {
        id: String,
        #[source]
        source: NetError,
    },

    /// The resource reported a size the cache cannot work with.
    #[error("resource {id} has invalid size: {source}")]
    InvalidSize {
        id: String,
        #[source]
        source: StorageError,
    },

    /// One fetch of a chunk failed; it will be retried.
    #[error("chunk {index} fetch failed: {source}")]
    ChunkFetchFailed {
        index: usize,
        #[source]
        source: NetError,
    },

    /// A chunk exhausted its retries.
    #[error("chunk {index} unavailable")]
    ChunkUnavailable { index: usize },

    #[error("wait timed out")]
    WaitTimedOut,

    #[error("cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type CacheResult<T> = Result<T, CacheError>;

impl From<CacheError> for std::io::Error {
    fn from(error: CacheError) -> Self {
        use std::io::ErrorKind;

        let kind = match &error {
            CacheError::WaitTimedOut => ErrorKind::TimedOut,
            CacheError::Cancelled => ErrorKind::Interrupted,
            CacheError::ChunkUnavailable { .. }
            | CacheError::ChunkFetchFailed { .. }
            | CacheError::ResourceUnavailable { .. } => ErrorKind::NotConnected,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, error)
    }
}
