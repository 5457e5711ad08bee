//! Lock markers guarding cache population.
//!
//! Uses advisory whole-file locks (`flock` on Unix), which are held per open
//! file description, so two handles in the same process exclude each other
//! just like two processes do.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Poll interval while waiting with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Outcome of an attempt to become the populator.
pub(crate) enum Acquire {
    /// This caller holds the exclusive lock.
    Exclusive(LockMarker),
    /// Another caller holds the lock; the handle can wait for it.
    Contended(File),
    /// The locked file was unlinked by a finished populator after we opened it.
    Stale,
}

/// Exclusively locked marker file. Unlinked and unlocked on drop.
pub(crate) struct LockMarker {
    file: File,
    path: PathBuf,
}

impl LockMarker {
    /// Open (creating) the marker at `path` and try to lock it exclusively.
    pub(crate) fn try_acquire(path: &Path) -> io::Result<Acquire> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => {
                if is_same_file(&file, path)? {
                    Ok(Acquire::Exclusive(Self {
                        file,
                        path: path.to_path_buf(),
                    }))
                } else {
                    Ok(Acquire::Stale)
                }
            }
            Err(TryLockError::WouldBlock) => Ok(Acquire::Contended(file)),
            Err(TryLockError::Error(e)) => Err(e),
        }
    }
}

impl Drop for LockMarker {
    fn drop(&mut self) {
        // Unlink while still locked so late openers of the old file see it as stale
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), "Failed to remove lock marker: {e}");
        }
        let _ = self.file.unlock();
    }
}

/// Block until the holder of the exclusive lock on `file` releases it.
///
/// Returns `false` if `timeout` expired first.
pub(crate) fn wait_for_release(file: &File, timeout: Option<Duration>) -> io::Result<bool> {
    let Some(timeout) = timeout else {
        file.lock_shared()?;
        file.unlock()?;
        return Ok(true);
    };

    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_shared() {
            Ok(()) => {
                file.unlock()?;
                return Ok(true);
            }
            Err(TryLockError::WouldBlock) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(false);
                }
                thread::sleep(POLL_INTERVAL.min(deadline - now));
            }
            Err(TryLockError::Error(e)) => return Err(e),
        }
    }
}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}
