//! Filesystem-based locking for cross-process coordination
//!
//! Every cache commit is a read-modify-write of the whole document. The
//! in-process mutex in the indexing session serializes writers inside one
//! process; this flock()-based lock serializes them across processes sharing
//! the same state directory.

use crate::error::CacheError;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lock file path guarding a cache document (`cache.json` -> `cache.json.lock`)
pub(crate) fn lock_file_path(document: &Path) -> PathBuf {
    let mut name = document
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    document.with_file_name(name)
}

/// Guard that holds an exclusive filesystem lock
///
/// The lock is automatically released when this guard is dropped.
/// If the process crashes, the OS automatically releases the flock.
pub struct CacheLock {
    _file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Try to acquire the lock for `document`, non-blocking
    ///
    /// Returns:
    /// - `Ok(Some(guard))` if the lock was acquired
    /// - `Ok(None)` if another holder has it
    /// - `Err(...)` on IO errors
    pub fn try_acquire(document: &Path) -> Result<Option<Self>, CacheError> {
        let lock_path = lock_file_path(document);

        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CacheError::Lock(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let file = File::create(&lock_path).map_err(|e| {
            CacheError::Lock(format!("failed to create {}: {}", lock_path.display(), e))
        })?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::trace!("Acquired cache lock {:?}", lock_path);
                Ok(Some(Self {
                    _file: file,
                    path: lock_path,
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Cache lock {:?} is held elsewhere", lock_path);
                Ok(None)
            }
            Err(e) => Err(CacheError::Lock(e.to_string())),
        }
    }

    /// Acquire the lock, polling until available or until `timeout` elapses
    pub fn acquire(document: &Path, timeout: Duration) -> Result<Self, CacheError> {
        let start = Instant::now();
        let sleep_interval = Duration::from_millis(50);

        loop {
            if let Some(guard) = Self::try_acquire(document)? {
                return Ok(guard);
            }
            if start.elapsed() >= timeout {
                tracing::warn!(
                    "Timeout waiting for cache lock on {} after {:?}",
                    document.display(),
                    timeout
                );
                return Err(CacheError::Lock(format!(
                    "timed out after {:?} waiting for {}",
                    timeout,
                    lock_file_path(document).display()
                )));
            }
            std::thread::sleep(sleep_interval);
        }
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        // Closing the file releases the lock; the lock file itself is reused
        tracing::trace!("Releasing cache lock {:?}", self.path);
    }
}
