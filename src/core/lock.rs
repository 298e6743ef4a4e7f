//! Cross-process advisory locking for manifest writers.
//!
//! The lock is taken on a sidecar `<target>.lock` file rather than the target
//! itself: every save renames a fresh file over the target, so a lock held on
//! the target's old inode would not exclude a writer that opened the new one.
//!
//! Advisory locks only exclude participants that also take them. On targets
//! without an OS primitive the [`NoopLock`] strategy is selected, which performs
//! no exclusion at all; [`AdvisoryLock::is_enforcing`] reports which one is active.

use crate::core::error::AtlasError;
use fs2::FileExt;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub trait AdvisoryLock: Send + Sync + fmt::Debug {
    /// Take an exclusive lock on `file`, polling until `timeout` elapses.
    ///
    /// `path` is only used to describe the lock in errors and logs.
    fn acquire(&self, file: &File, path: &Path, timeout: Duration) -> Result<(), AtlasError>;

    /// Best-effort unlock. Failures are swallowed: the handle is closed right after.
    fn release(&self, file: &File);

    /// False when this strategy provides no mutual exclusion.
    fn is_enforcing(&self) -> bool;
}

/// OS-level exclusive lock (`flock` on unix, `LockFileEx` on windows) with bounded retry.
#[derive(Debug, Clone)]
pub struct FileLock {
    poll_interval: Duration,
}

impl FileLock {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for FileLock {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl AdvisoryLock for FileLock {
    fn acquire(&self, file: &File, path: &Path, timeout: Duration) -> Result<(), AtlasError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut contended = false;
        loop {
            match FileExt::try_lock_exclusive(file) {
                Ok(()) => {
                    if contended {
                        debug!(path = %path.display(), waited_ms = started.elapsed().as_millis() as u64, "lock acquired after contention");
                    }
                    return Ok(());
                }
                Err(e) if is_contended(&e) => {
                    if !contended {
                        debug!(path = %path.display(), "lock held by another process, waiting");
                        contended = true;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(path = %path.display(), timeout_ms = timeout.as_millis() as u64, "lock timeout");
                        return Err(AtlasError::LockTimeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    thread::sleep(self.poll_interval.min(deadline - now));
                }
                Err(e) => return Err(AtlasError::IoError(e)),
            }
        }
    }

    fn release(&self, file: &File) {
        let _ = FileExt::unlock(file);
    }

    fn is_enforcing(&self) -> bool {
        true
    }
}

fn is_contended(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    let contended = fs2::lock_contended_error();
    e.raw_os_error().is_some() && e.raw_os_error() == contended.raw_os_error()
}

/// Degraded strategy for platforms without advisory locking: never blocks, never excludes.
#[derive(Debug, Clone, Default)]
pub struct NoopLock;

impl AdvisoryLock for NoopLock {
    fn acquire(&self, _file: &File, _path: &Path, _timeout: Duration) -> Result<(), AtlasError> {
        Ok(())
    }

    fn release(&self, _file: &File) {}

    fn is_enforcing(&self) -> bool {
        false
    }
}

/// The strategy for the compilation target, chosen explicitly rather than by fallback.
#[cfg(any(unix, windows))]
pub fn platform_lock(poll_interval: Duration) -> Box<dyn AdvisoryLock> {
    Box::new(FileLock::new(poll_interval))
}

#[cfg(not(any(unix, windows)))]
pub fn platform_lock(_poll_interval: Duration) -> Box<dyn AdvisoryLock> {
    warn!("advisory locking is unavailable on this platform; concurrent writers are not excluded");
    Box::new(NoopLock)
}

pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

/// Lock strategy plus how long writers wait for it.
#[derive(Debug)]
pub struct LockPolicy {
    lock: Box<dyn AdvisoryLock>,
    timeout: Duration,
}

impl LockPolicy {
    pub fn new(lock: Box<dyn AdvisoryLock>, timeout: Duration) -> Self {
        Self { lock, timeout }
    }

    pub fn platform(timeout: Duration, poll_interval: Duration) -> Self {
        Self::new(platform_lock(poll_interval), timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_enforcing(&self) -> bool {
        self.lock.is_enforcing()
    }

    /// Lock the sidecar of `target` for as long as the returned guard lives.
    pub fn guard(&self, target: &Path) -> Result<LockGuard<'_>, AtlasError> {
        let path = lock_path_for(target);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        self.lock.acquire(&file, &path, self.timeout)?;
        Ok(LockGuard {
            file,
            path,
            lock: self.lock.as_ref(),
        })
    }
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self::platform(DEFAULT_LOCK_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

#[derive(Debug)]
pub struct LockGuard<'a> {
    file: File,
    path: PathBuf,
    lock: &'a dyn AdvisoryLock,
}

impl LockGuard<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release(&self.file);
    }
}
