//! Advisory locking for the image cache archive
//!
//! Save and load both hold an exclusive lock on `<archive>.lock` so that two
//! jobs sharing a host cannot interleave a half-written archive with a read.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// How long to wait for a competing job before giving up (10 minutes; an
/// image save over a slow disk can take a while).
const LOCK_TIMEOUT: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to open lock file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Timeout acquiring lock on {path} after {timeout_secs} seconds")]
    Timeout { path: PathBuf, timeout_secs: u64 },
}

/// An exclusive lock on the cache archive.
///
/// Released (and the lock file removed) on drop.
pub struct ArchiveLock {
    _file: File,
    path: PathBuf,
}

impl ArchiveLock {
    /// Acquire the lock, blocking until available or until the timeout.
    pub fn acquire(lock_path: &Path) -> Result<Self, LockError> {
        let start = Instant::now();

        loop {
            match Self::try_acquire(lock_path)? {
                Some(lock) => return Ok(lock),
                None => {
                    if start.elapsed() >= LOCK_TIMEOUT {
                        return Err(LockError::Timeout {
                            path: lock_path.to_path_buf(),
                            timeout_secs: LOCK_TIMEOUT.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        }
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, LockError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: lock_path.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(lock_path)
            .map_err(|source| LockError::Io {
                path: lock_path.to_path_buf(),
                source,
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(ArchiveLock {
                _file: file,
                path: lock_path.to_path_buf(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            // Some Unix platforms report contention as EAGAIN or EACCES
            // instead of WouldBlock.
            Err(e) if e.raw_os_error() == Some(11) => Ok(None),
            Err(e) if e.raw_os_error() == Some(13) => Ok(None),
            Err(source) => Err(LockError::Io {
                path: lock_path.to_path_buf(),
                source,
            }),
        }
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        // Another process may already have removed it or taken a new lock;
        // the unlock itself is implicit in closing the file.
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Lock file path for an archive: `<archive>.lock`
pub fn lock_path_for(archive_path: &Path) -> PathBuf {
    let mut lock_path = archive_path.as_os_str().to_owned();
    lock_path.push(".lock");
    PathBuf::from(lock_path)
}
