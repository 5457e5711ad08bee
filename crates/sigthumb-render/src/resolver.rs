//! Mapping between source objects and identifiers.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::source::Source;

/// Resolution error.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The identifier (or object) cannot name anything this resolver serves.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Nothing exists for the identifier.
    #[error("Source not found: {0}")]
    NotFound(String),

    /// The source exists but could not be opened.
    #[error("Failed to open {}: {source}", .path.display())]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Two-way mapping between source objects and string identifiers.
///
/// The identifier is what ends up (escaped) in thumbnail URLs; the server
/// turns it back into a readable [`Source`] when a thumbnail is rendered.
pub trait Resolver: Send + Sync {
    /// Identifier for a source object.
    fn identify(&self, object: &Path) -> Result<String, ResolveError>;

    /// Open the source object named by `identifier`.
    fn open(&self, identifier: &str) -> Result<Source, ResolveError>;
}

/// Resolver serving files below a root directory.
///
/// Identifiers are root-relative paths with forward slashes.
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    /// Create a resolver rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Filesystem path for an identifier.
    ///
    /// Rejects absolute paths and `..` so identifiers cannot escape the root.
    fn path_for(&self, identifier: &str) -> Result<PathBuf, ResolveError> {
        let relative = Path::new(identifier);
        let mut saw_normal = false;
        for component in relative.components() {
            match component {
                Component::Normal(_) => saw_normal = true,
                Component::CurDir => {}
                _ => return Err(ResolveError::InvalidIdentifier(identifier.to_owned())),
            }
        }
        if !saw_normal {
            return Err(ResolveError::InvalidIdentifier(identifier.to_owned()));
        }
        Ok(self.root.join(relative))
    }
}

impl Resolver for FsResolver {
    fn identify(&self, object: &Path) -> Result<String, ResolveError> {
        let invalid = || ResolveError::InvalidIdentifier(object.display().to_string());
        let relative = if object.is_absolute() {
            object.strip_prefix(&self.root).map_err(|_| invalid())?
        } else {
            object
        };

        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str().ok_or_else(invalid)?),
                Component::CurDir => {}
                _ => return Err(invalid()),
            }
        }
        if parts.is_empty() {
            return Err(invalid());
        }
        Ok(parts.join("/"))
    }

    fn open(&self, identifier: &str) -> Result<Source, ResolveError> {
        let path = self.path_for(identifier)?;
        if !path.is_file() {
            return Err(ResolveError::NotFound(identifier.to_owned()));
        }
        let file = File::open(&path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ResolveError::NotFound(identifier.to_owned()),
            _ => ResolveError::Io {
                path: path.clone(),
                source,
            },
        })?;
        tracing::debug!(identifier, path = %path.display(), "Opened source");
        Ok(Source::new(identifier, file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn resolver_with_file() -> (TempDir, FsResolver) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("contains/sub")).unwrap();
        fs::write(tmp.path().join("contains/sub/dirs"), b"blah blah blah").unwrap();
        let resolver = FsResolver::new(tmp.path());
        (tmp, resolver)
    }

    #[test]
    fn test_identify_relative_and_absolute() {
        let (tmp, resolver) = resolver_with_file();

        assert_eq!(
            resolver.identify(Path::new("contains/sub/dirs")).unwrap(),
            "contains/sub/dirs"
        );
        assert_eq!(
            resolver
                .identify(&tmp.path().join("contains/sub/dirs"))
                .unwrap(),
            "contains/sub/dirs"
        );
    }

    #[test]
    fn test_identify_rejects_outside_root() {
        let (_tmp, resolver) = resolver_with_file();

        for object in ["/etc/passwd", "../secret", "", "."] {
            assert!(
                matches!(
                    resolver.identify(Path::new(object)),
                    Err(ResolveError::InvalidIdentifier(_))
                ),
                "{object:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_open_reads_file() {
        let (_tmp, resolver) = resolver_with_file();

        let mut source = resolver.open("contains/sub/dirs").unwrap();
        assert_eq!(source.name(), "contains/sub/dirs");
        assert_eq!(source.read_all().unwrap(), b"blah blah blah");
    }

    #[test]
    fn test_open_missing() {
        let (_tmp, resolver) = resolver_with_file();

        assert!(matches!(
            resolver.open("contains/nothing"),
            Err(ResolveError::NotFound(_))
        ));
        // Directories are not sources
        assert!(matches!(
            resolver.open("contains/sub"),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_open_rejects_traversal() {
        let (_tmp, resolver) = resolver_with_file();

        for identifier in ["../outside", "contains/../../outside", "/etc/passwd", ""] {
            assert!(
                matches!(
                    resolver.open(identifier),
                    Err(ResolveError::InvalidIdentifier(_))
                ),
                "{identifier:?} should be rejected"
            );
        }
    }
}
