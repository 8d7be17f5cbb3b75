use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid chunk layout: chunk size {chunk_size}, total size {total_size}")]
    InvalidLayout { chunk_size: u64, total_size: u64 },

    #[error("chunk {index} out of range (chunk count {count})")]
    ChunkOutOfRange { index: usize, count: usize },

    #[error("chunk {index} payload has {got} bytes, expected {expected}")]
    PayloadSize {
        index: usize,
        expected: u64,
        got: u64,
    },

    #[error("cached file has {got} bytes, expected {expected}")]
    SizeMismatch { expected: u64, got: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;
