//! Rendering styles.
//!
//! A style names a processor, an output extension, a version and an opaque
//! options blob handed to the processor. The version is part of every signed
//! URL: bumping it makes all previously issued URLs for the style stale.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

/// A named rendering configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleSpec {
    /// Style name (`[a-z0-9_]+`).
    pub name: String,
    /// Name of the processor backend that renders this style.
    pub processor: String,
    /// Output file extension (`[a-z0-9]+`).
    pub extension: String,
    /// Style version, bumped whenever rendering parameters change.
    pub version: u32,
    /// Processor options, passed through verbatim.
    pub options: Value,
}

impl StyleSpec {
    /// Create a style with empty options.
    pub fn new(
        name: impl Into<String>,
        processor: impl Into<String>,
        extension: impl Into<String>,
        version: u32,
    ) -> Self {
        Self {
            name: name.into(),
            processor: processor.into(),
            extension: extension.into(),
            version,
            options: Value::Null,
        }
    }

    /// Attach processor options.
    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// Version in the decimal form used inside URLs.
    #[must_use]
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }
}

/// Lookup of styles by name.
///
/// Implementations are long-lived configuration; the validator and the URL
/// builder consult them on every request.
pub trait StyleRegistry: Send + Sync {
    /// Get a style by name.
    fn style(&self, name: &str) -> Option<Arc<StyleSpec>>;
}

/// In-memory [`StyleRegistry`] built from configuration.
#[derive(Debug, Clone, Default)]
pub struct Styles {
    styles: BTreeMap<String, Arc<StyleSpec>>,
}

impl Styles {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a style, replacing any style with the same name.
    #[must_use]
    pub fn with_style(mut self, style: StyleSpec) -> Self {
        self.insert(style);
        self
    }

    /// Add a style, replacing any style with the same name.
    pub fn insert(&mut self, style: StyleSpec) {
        self.styles.insert(style.name.clone(), Arc::new(style));
    }

    /// Iterate over styles in name order.
    pub fn iter(&self) -> impl Iterator<Item = &StyleSpec> {
        self.styles.values().map(AsRef::as_ref)
    }

    /// Number of styles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Whether no styles are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

impl StyleRegistry for Styles {
    fn style(&self, name: &str) -> Option<Arc<StyleSpec>> {
        self.styles.get(name).cloned()
    }
}

/// Whether `name` is usable as a style segment of a URL (`[a-z0-9_]+`).
#[must_use]
pub fn is_valid_style_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Whether `extension` is usable as an extension segment of a URL (`[a-z0-9]+`).
#[must_use]
pub fn is_valid_extension(extension: &str) -> bool {
    !extension.is_empty()
        && extension
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}
