//! Readable source objects handed to processors.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::path::Path;

/// An opened source image.
///
/// The name is informational (used for format hints and log messages); the
/// bytes come from the reader. Dropping the source releases whatever the
/// reader holds, such as an open file.
pub struct Source {
    name: String,
    reader: Box<dyn Read + Send>,
}

impl Source {
    /// Wrap a reader.
    pub fn new(name: impl Into<String>, reader: impl Read + Send + 'static) -> Self {
        Self {
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    /// Source backed by an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(name, Cursor::new(bytes.into()))
    }

    /// Source name, usually the identifier it was opened for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased file extension of the name, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty())
            .map(str::to_ascii_lowercase)
    }

    /// Read the remaining bytes.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.reader.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension() {
        assert_eq!(
            Source::from_bytes("photos/Cat.PNG", vec![]).extension().as_deref(),
            Some("png")
        );
        assert_eq!(Source::from_bytes("photos/cat", vec![]).extension(), None);
        assert_eq!(Source::from_bytes("photos.d/cat", vec![]).extension(), None);
    }

    #[test]
    fn test_read_all() {
        let mut source = Source::from_bytes("blob", b"blah blah blah".to_vec());
        assert_eq!(source.read_all().unwrap(), b"blah blah blah");
        assert!(source.read_all().unwrap().is_empty());
    }
}
