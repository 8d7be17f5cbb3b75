use std::ops::Range;

use crate::{StorageError, StorageResult};

/// Geometry of a chunked resource.
///
/// Chunk `i` covers `[i * chunk_size, min((i + 1) * chunk_size, total_size))`;
/// only the last chunk may be shorter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    chunk_size: u64,
    total_size: u64,
}

impl ChunkLayout {
    /// # Errors
    ///
    /// [`StorageError::InvalidLayout`] when either size is zero.
    pub fn new(chunk_size: u64, total_size: u64) -> StorageResult<Self> {
        if chunk_size == 0 || total_size == 0 {
            return Err(StorageError::InvalidLayout {
                chunk_size,
                total_size,
            });
        }
        Ok(Self {
            chunk_size,
            total_size,
        })
    }

    #[must_use]
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.total_size.div_ceil(self.chunk_size) as usize
    }

    #[must_use]
    pub fn last_index(&self) -> usize {
        self.num_chunks() - 1
    }

    /// Chunk covering `offset`, or `None` past the end.
    #[must_use]
    pub fn index_of(&self, offset: u64) -> Option<usize> {
        (offset < self.total_size).then(|| (offset / self.chunk_size) as usize)
    }

    /// Chunk covering `offset`, clamped to the last chunk.
    #[must_use]
    pub fn clamped_index_of(&self, offset: u64) -> usize {
        ((offset / self.chunk_size) as usize).min(self.last_index())
    }

    #[must_use]
    pub fn range_of(&self, index: usize) -> Option<Range<u64>> {
        let start = (index as u64).checked_mul(self.chunk_size)?;
        if start >= self.total_size {
            return None;
        }
        Some(start..(start + self.chunk_size).min(self.total_size))
    }

    #[must_use]
    pub fn len_of(&self, index: usize) -> u64 {
        self.range_of(index).map_or(0, |r| r.end - r.start)
    }

    /// Indices of the chunks intersecting `range`, clipped to the resource.
    #[must_use]
    pub fn chunks_covering(&self, range: &Range<u64>) -> Range<usize> {
        let end = range.end.min(self.total_size);
        if range.start >= end {
            return 0..0;
        }
        let first = (range.start / self.chunk_size) as usize;
        let last = ((end - 1) / self.chunk_size) as usize;
        first..last + 1
    }
}
