//! Cross-process exclusive lock with a bounded wait.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs4::FileExt;

use crate::error::{MetastoreError, Result};

/// Default time to wait for a contended lock.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// Default pause between attempts on a contended lock.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// An advisory lock on a file, shared by every process using the same path.
#[derive(Clone, Debug)]
pub struct LockFile {
    path: PathBuf,
    max_wait: Duration,
    retry_interval: Duration,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_wait: DEFAULT_MAX_WAIT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    pub fn with_timing(mut self, max_wait: Duration, retry_interval: Duration) -> Self {
        self.max_wait = max_wait;
        self.retry_interval = retry_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Take the lock, retrying until `max_wait` has passed.
    ///
    /// Fails with [`MetastoreError::LockTimeout`] if another holder keeps it
    /// for longer than that.
    pub fn acquire(&self) -> Result<LockGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(LockGuard { file }),
                Err(err) if is_contended(&err) => {
                    let waited = started.elapsed();
                    if waited >= self.max_wait {
                        return Err(MetastoreError::LockTimeout {
                            path: self.path.clone(),
                            waited,
                        });
                    }
                    thread::sleep(self.retry_interval.min(self.max_wait - waited));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn is_contended(err: &io::Error) -> bool {
    // ERROR_LOCK_VIOLATION on Windows.
    err.kind() == io::ErrorKind::WouldBlock || (cfg!(windows) && err.raw_os_error() == Some(33))
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
