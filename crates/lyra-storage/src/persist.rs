use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{StorageError, StorageResult};

/// Directory of fully downloaded resources, one file per resource id.
///
/// Files are named by the SHA-256 of the id. Writes go to a uniquely named
/// temp file first and are renamed into place, so a file under its final
/// name is always complete.
#[derive(Clone, Debug)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, resource_id: &str) -> PathBuf {
        let key = hex::encode(Sha256::digest(resource_id.as_bytes()));
        self.root.join(format!("{key}.audio"))
    }

    /// Load a complete copy of `resource_id` if one of `expected_len` bytes exists.
    ///
    /// A file of any other length is stale and ignored.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] for read failures other than a missing file.
    pub fn load(&self, resource_id: &str, expected_len: u64) -> StorageResult<Option<Bytes>> {
        let path = self.path_for(resource_id);
        let len = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if len != expected_len {
            warn!(path = %path.display(), len, expected_len, "ignoring stale cache file");
            return Ok(None);
        }
        let data = fs::read(&path)?;
        if data.len() as u64 != expected_len {
            return Err(StorageError::SizeMismatch {
                expected: expected_len,
                got: data.len() as u64,
            });
        }
        debug!(path = %path.display(), len, "loaded cached resource");
        Ok(Some(Bytes::from(data)))
    }

    /// Write `chunks` in order as the cached copy of `resource_id`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] if the directory, temp file or rename fails.
    pub fn store(&self, resource_id: &str, chunks: &[Bytes]) -> StorageResult<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let path = self.path_for(resource_id);

        let mut temp = NamedTempFile::new_in(&self.root)?;
        for chunk in chunks {
            temp.write_all(chunk)?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;
        debug!(path = %path.display(), "cached resource written");
        Ok(path)
    }

    /// Remove the cached copy of `resource_id`, if any.
    ///
    /// # Errors
    ///
    /// [`StorageError::Io`] for failures other than a missing file.
    pub fn remove(&self, resource_id: &str) -> StorageResult<()> {
        match fs::remove_file(self.path_for(resource_id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
