use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;

use crate::{cache::StreamingCache, error::CacheResult};

/// Blocking `Read + Seek` view over a [`StreamingCache`].
///
/// Reads of uncached bytes prioritize them, fetch out of band if needed and
/// park the calling thread until they arrive or the read timeout passes.
/// Intended for decoder threads; never call it from an async task.
#[derive(Debug)]
pub struct CacheReader {
    cache: StreamingCache,
    pos: u64,
}

impl CacheReader {
    pub(crate) fn new(cache: StreamingCache) -> Self {
        Self { cache, pos: 0 }
    }

    /// Read at an absolute offset without moving the cursor.
    ///
    /// Returns `Ok(0)` at or past the end.
    ///
    /// # Errors
    ///
    /// A timeout, an unavailable chunk or cancellation when the bytes cannot
    /// be delivered.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> CacheResult<usize> {
        self.cache.read_blocking(offset, buf)
    }

    /// Up to `length` bytes from `offset`; shorter only at the end.
    ///
    /// # Errors
    ///
    /// Same as [`read_at`](Self::read_at).
    pub fn read_range(&self, offset: u64, length: usize) -> CacheResult<Bytes> {
        let available = self.len().saturating_sub(offset);
        let length = length.min(usize::try_from(available).unwrap_or(usize::MAX));
        let mut buf = vec![0u8; length];
        let mut filled = 0;
        while filled < length {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    #[must_use]
    pub fn position(&self) -> u64 {
        self.pos
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.total_size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn cache(&self) -> &StreamingCache {
        &self.cache
    }
}

impl Read for CacheReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.read_at(self.pos, buf)?;
        self.pos = self.pos.saturating_add(n as u64);
        Ok(n)
    }
}

impl Seek for CacheReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let current = self.pos;
        let len = self.len();
        let new_pos: i128 = match pos {
            SeekFrom::Start(p) => i128::from(p),
            SeekFrom::Current(delta) => i128::from(current).saturating_add(i128::from(delta)),
            SeekFrom::End(delta) => i128::from(len).saturating_add(i128::from(delta)),
        };

        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "negative seek position",
            ));
        }
        let new_pos = u64::try_from(new_pos).unwrap_or(u64::MAX);
        if new_pos > len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("seek past EOF: new_pos={new_pos} len={len} seek_from={pos:?}"),
            ));
        }

        self.pos = new_pos;
        Ok(new_pos)
    }
}
