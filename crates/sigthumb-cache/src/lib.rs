//! On-disk cache for rendered thumbnails.
//!
//! [`CacheStore`] maps a cache key (a relative path such as
//! `photos/cat-small-1-<signature>.jpg`) to a file below the cache root and
//! populates missing entries at most once at a time, across threads and
//! processes sharing the same directory.
//!
//! # Population protocol
//!
//! ```text
//! exists?  ──yes──► serve
//!    │no
//!    ▼
//! open <key>.lock, try exclusive lock
//!    ├─ acquired ──► render into temp file ──► rename onto <key> ──► unlink marker, unlock
//!    └─ contended ─► wait for shared lock ──► exists? ──yes──► serve
//!                                               │no (populator failed)
//!                                               └──► retry as candidate populator
//! ```
//!
//! The rename is the only step that makes an entry visible, so readers never
//! observe partial output, and a crash mid-render leaves at worst a stale
//! marker that the next request locks and reuses.

mod lock;
mod store;

pub use store::CacheStore;

use std::path::{Path, PathBuf};

/// Cache store error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key is not a safe relative path.
    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    /// Filesystem failure unrelated to lock contention.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A concurrent render did not finish within the wait timeout.
    #[error("Timed out waiting for concurrent render of {0}")]
    WaitTimeout(String),

    /// Every attempt found another populator in the way.
    #[error("Gave up populating {key} after {attempts} attempts")]
    Contended {
        /// Cache key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the failure is due to other requests holding the entry.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::WaitTimeout(_) | Self::Contended { .. })
    }
}

/// Error from [`CacheStore::get_or_create`].
#[derive(Debug, thiserror::Error)]
pub enum PopulateError<E> {
    /// The producer failed while this caller was the populator.
    #[error("{0}")]
    Producer(E),

    /// The cache itself failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}
