//! Exclusive advisory file locks.
//!
//! Locks are taken with `flock(LOCK_EX | LOCK_NB)` and retried until a
//! deadline. Each acquisition opens its own descriptor, so two threads of
//! one process contend exactly like two processes do.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Held lock. Released when dropped.
#[derive(Debug)]
pub(crate) struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the lock at `path`, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the deadline passes without the lock.
    pub(crate) fn acquire(
        path: &Path,
        timeout: Duration,
        poll_interval: Duration,
    ) -> io::Result<Option<Self>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            if try_lock_exclusive(&file)? {
                debug!(
                    path = %path.display(),
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Acquired table lock"
                );
                return Ok(Some(Self {
                    file,
                    path: path.to_path_buf(),
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    path = %path.display(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for table lock"
                );
                return Ok(None);
            }
            thread::sleep(poll_interval.min(deadline - now));
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if rc != 0 {
            warn!(
                path = %self.path.display(),
                error = %io::Error::last_os_error(),
                "Failed to release table lock"
            );
        } else {
            debug!(path = %self.path.display(), "Released table lock");
        }
    }
}

/// Non-blocking exclusive lock attempt.
///
/// `Ok(false)` means another holder has it.
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EWOULDBLOCK) | Some(libc::EINTR) => Ok(false),
        _ => Err(err),
    }
}
