//! Cache store with single-populator guarantee.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::lock::{self, Acquire, LockMarker};
use crate::{CacheError, PopulateError};

/// Default number of acquire attempts before giving up.
const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// Suffix of lock marker files.
const LOCK_SUFFIX: &str = ".lock";

/// File-based thumbnail cache rooted at a directory.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- photos/
///     +-- cat-small-1-<sig>.jpg        # published entry
///     +-- dog-small-1-<sig>.jpg.lock   # marker, only while rendering
///     +-- .tmpXXXXXX.tmp               # staging file of the render in flight
/// ```
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    max_attempts: u32,
    wait_timeout: Option<Duration>,
}

impl CacheStore {
    /// Create a store rooted at `root`. The directory is created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            wait_timeout: None,
        }
    }

    /// Limit how many times a caller may try to become the populator.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Bound each wait for a concurrent populator (`None` waits indefinitely).
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Option<Duration>) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Filesystem path of the entry for `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, CacheError> {
        let relative = Path::new(key);
        let file_name = relative.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let safe = !key.is_empty()
            && relative.components().all(|c| matches!(c, Component::Normal(_)))
            && !file_name.starts_with('.')
            && !file_name.ends_with(LOCK_SUFFIX);

        if !safe {
            return Err(CacheError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(relative))
    }

    /// Path of the published entry for `key`, if there is one.
    pub fn get(&self, key: &str) -> Result<Option<PathBuf>, CacheError> {
        let target = self.path_for(key)?;
        Ok(is_file(&target).then_some(target))
    }

    /// Return the entry for `key`, rendering it with `producer` if missing.
    ///
    /// At most one caller at a time runs a producer for a given key. Callers
    /// arriving while a render is in flight wait for it and then use its
    /// output; if it failed, one of them becomes the next populator. The
    /// producer writes into a staging file that is renamed onto the entry path
    /// only after it returns `Ok`, so a failed or interrupted render never
    /// leaves a partial entry.
    ///
    /// `producer` is called at most once. Its error is returned only to the
    /// caller that ran it.
    pub fn get_or_create<F, E>(&self, key: &str, producer: F) -> Result<PathBuf, PopulateError<E>>
    where
        F: FnOnce(&mut dyn Write) -> Result<(), E>,
    {
        let target = self.path_for(key)?;
        if is_file(&target) {
            tracing::debug!(key, "Cache hit");
            return Ok(target);
        }

        let dir = target
            .parent()
            .ok_or_else(|| CacheError::InvalidKey(key.to_owned()))?;
        fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

        let lock_path = lock_path_for(&target);
        match self.acquire(key, &target, &lock_path)? {
            Some(marker) => self.populate(key, &target, marker, producer),
            None => Ok(target),
        }
    }

    /// Become the populator, or wait until someone else published the entry.
    ///
    /// Returns `None` once the entry exists.
    fn acquire(
        &self,
        key: &str,
        target: &Path,
        lock_path: &Path,
    ) -> Result<Option<LockMarker>, CacheError> {
        for attempt in 1..=self.max_attempts {
            match LockMarker::try_acquire(lock_path).map_err(|e| CacheError::io(lock_path, e))? {
                Acquire::Exclusive(marker) => {
                    // Published between the existence check and the lock
                    if is_file(target) {
                        tracing::debug!(key, "Cache hit after acquiring lock");
                        return Ok(None);
                    }
                    return Ok(Some(marker));
                }
                Acquire::Contended(file) => {
                    tracing::debug!(key, attempt, "Waiting for concurrent render");
                    let released = lock::wait_for_release(&file, self.wait_timeout)
                        .map_err(|e| CacheError::io(lock_path, e))?;
                    if !released {
                        return Err(CacheError::WaitTimeout(key.to_owned()));
                    }
                    if is_file(target) {
                        return Ok(None);
                    }
                    tracing::debug!(key, attempt, "Concurrent render failed, retrying");
                }
                Acquire::Stale => {
                    tracing::debug!(key, attempt, "Lock marker replaced, retrying");
                }
            }
        }

        Err(CacheError::Contended {
            key: key.to_owned(),
            attempts: self.max_attempts,
        })
    }

    /// Run the producer into a staging file and publish it.
    #[allow(clippy::unused_self)]
    fn populate<F, E>(
        &self,
        key: &str,
        target: &Path,
        marker: LockMarker,
        producer: F,
    ) -> Result<PathBuf, PopulateError<E>>
    where
        F: FnOnce(&mut dyn Write) -> Result<(), E>,
    {
        let dir = target
            .parent()
            .ok_or_else(|| CacheError::InvalidKey(key.to_owned()))?;
        let mut staging = tempfile::Builder::new()
            .prefix(".tmp")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| CacheError::io(dir, e))?;

        tracing::debug!(key, "Rendering cache entry");
        if let Err(e) = producer(staging.as_file_mut()) {
            // Staging file is deleted and the marker released on drop
            drop(staging);
            drop(marker);
            return Err(PopulateError::Producer(e));
        }

        staging
            .as_file_mut()
            .flush()
            .and_then(|()| staging.as_file().sync_all())
            .map_err(|e| CacheError::io(staging.path(), e))?;
        set_readable(staging.path()).map_err(|e| CacheError::io(target, e))?;
        staging
            .persist(target)
            .map_err(|e| CacheError::io(target, e.error))?;
        drop(marker);

        tracing::info!(key, "Published cache entry");
        Ok(target.to_path_buf())
    }
}

/// Marker path for an entry path (`<entry>.lock`).
fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}

fn is_file(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| m.is_file())
}

/// Staging files are created owner-only; published entries are world-readable.
#[cfg(unix)]
fn set_readable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_readable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
