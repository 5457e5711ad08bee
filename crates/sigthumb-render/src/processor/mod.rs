//! Image processors.
//!
//! A [`Processor`] reads a [`Source`] and writes the rendered thumbnail to a
//! sink. Styles name their processor; [`ProcessorRegistry`] maps those names
//! to implementations. Two backends are built in:
//!
//! - `"image"`: [`ImageProcessor`], pure Rust via the `image` crate
//! - `"magick"`: [`MagickProcessor`], shells out to ImageMagick

mod magick;
mod raster;

pub use magick::MagickProcessor;
pub use raster::ImageProcessor;

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::source::Source;

/// Default output quality.
const DEFAULT_QUALITY: u8 = 85;

static COLOR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#([0-9a-fA-F]{2})([0-9a-fA-F]{2})([0-9a-fA-F]{2})$").unwrap());

/// Processor failure.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The style options are not valid for this processor.
    #[error("Invalid processor options: {0}")]
    InvalidOptions(String),

    /// The source could not be decoded as an image.
    #[error("Failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    /// The thumbnail could not be encoded.
    #[error("Failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),

    /// The external backend is not installed.
    #[error("{binary} not found. {hint}")]
    Unavailable {
        /// Binary that was looked up.
        binary: String,
        /// Installation hint.
        hint: &'static str,
    },

    /// The external backend exited unsuccessfully.
    #[error("{binary} failed ({status}): {stderr}")]
    Backend {
        /// Binary that failed.
        binary: String,
        /// Exit status description.
        status: String,
        /// Diagnostic output of the backend.
        stderr: String,
    },

    /// Reading the source or writing the sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Renders a source image into a sink.
pub trait Processor: Send + Sync {
    /// Render `source` into `sink` as an `extension` file using the style's
    /// `options`.
    fn process(
        &self,
        source: &mut Source,
        sink: &mut dyn Write,
        extension: &str,
        options: &Value,
    ) -> Result<(), ProcessorError>;
}

/// How an image is fitted to the requested box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Scale down to fit inside the box, keeping the aspect ratio.
    #[default]
    Fit,
    /// Scale and centre-crop to exactly the box.
    Fill,
    /// Fit inside the box, then pad to exactly the box with the background.
    Pad,
    /// Stretch to exactly the box.
    Squash,
}

/// Options understood by the built-in processors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeOptions {
    /// Target width.
    pub width: Option<u32>,
    /// Target height.
    pub height: Option<u32>,
    /// Resize mode.
    pub resize: ResizeMode,
    /// `transparent` or `#rrggbb`, used by [`ResizeMode::Pad`].
    pub background: String,
    /// Lossy encoder quality (1-100).
    pub quality: u8,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            resize: ResizeMode::Fit,
            background: "transparent".to_owned(),
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ResizeOptions {
    /// Parse and validate style options (`null` means all defaults).
    pub fn from_value(options: &Value) -> Result<Self, ProcessorError> {
        let parsed: Self = if options.is_null() {
            Self::default()
        } else {
            Self::deserialize(options).map_err(|e| ProcessorError::InvalidOptions(e.to_string()))?
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<(), ProcessorError> {
        if self.width == Some(0) || self.height == Some(0) {
            return Err(ProcessorError::InvalidOptions(
                "width and height must be positive".to_owned(),
            ));
        }
        if self.resize != ResizeMode::Fit && (self.width.is_none() || self.height.is_none()) {
            return Err(ProcessorError::InvalidOptions(format!(
                "resize mode {:?} requires both width and height",
                self.resize
            )));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(ProcessorError::InvalidOptions(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            )));
        }
        self.background_rgba()?;
        Ok(())
    }

    /// Background colour as RGBA.
    pub fn background_rgba(&self) -> Result<[u8; 4], ProcessorError> {
        if self.background == "transparent" {
            return Ok([0, 0, 0, 0]);
        }
        let caps = COLOR_PATTERN.captures(&self.background).ok_or_else(|| {
            ProcessorError::InvalidOptions(format!("invalid colour: {}", self.background))
        })?;
        let channel = |i: usize| u8::from_str_radix(&caps[i], 16).unwrap_or(0);
        Ok([channel(1), channel(2), channel(3), 255])
    }
}

/// Named processors available to styles.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `"image"` and `"magick"` processors.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::builtin(magick::DEFAULT_BINARY)
    }

    /// Built-in processors, running ImageMagick from `magick_binary`.
    #[must_use]
    pub fn builtin(magick_binary: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register("image", Arc::new(ImageProcessor::new()));
        registry.register("magick", Arc::new(MagickProcessor::new(magick_binary)));
        registry
    }

    /// Register (or replace) a processor under `name`.
    pub fn register(&mut self, name: impl Into<String>, processor: Arc<dyn Processor>) {
        self.processors.insert(name.into(), processor);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with_processor(mut self, name: impl Into<String>, processor: Arc<dyn Processor>) -> Self {
        self.register(name, processor);
        self
    }

    /// Processor registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(name).map(Arc::clone)
    }

    /// Whether a processor is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.processors.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_options_default_on_null() {
        assert_eq!(
            ResizeOptions::from_value(&Value::Null).unwrap(),
            ResizeOptions::default()
        );
    }

    #[test]
    fn test_options_parse() {
        let options = ResizeOptions::from_value(&json!({
            "width": 100,
            "height": 80,
            "resize": "pad",
            "background": "#FF8000",
            "quality": 70
        }))
        .unwrap();

        assert_eq!(options.width, Some(100));
        assert_eq!(options.height, Some(80));
        assert_eq!(options.resize, ResizeMode::Pad);
        assert_eq!(options.quality, 70);
        assert_eq!(options.background_rgba().unwrap(), [255, 128, 0, 255]);
    }

    #[test]
    fn test_options_rejected() {
        for options in [
            json!({"resize": "stretch", "width": 10, "height": 10}),
            json!({"resize": "fill", "width": 10}),
            json!({"resize": "pad", "height": 10}),
            json!({"width": 0}),
            json!({"quality": 0}),
            json!({"quality": 101}),
            json!({"background": "red"}),
            json!({"unknown": true}),
            json!("fit"),
        ] {
            assert!(
                matches!(
                    ResizeOptions::from_value(&options),
                    Err(ProcessorError::InvalidOptions(_))
                ),
                "{options} should be rejected"
            );
        }
    }

    #[test]
    fn test_transparent_background() {
        assert_eq!(
            ResizeOptions::default().background_rgba().unwrap(),
            [0, 0, 0, 0]
        );
    }

    #[test]
    fn test_registry_defaults() {
        let registry = ProcessorRegistry::with_defaults();
        assert!(registry.contains("image"));
        assert!(registry.contains("magick"));
        assert!(registry.get("pil").is_none());
        assert_eq!(registry.names(), vec!["image", "magick"]);
    }

    #[test]
    fn test_registry_uses_configured_magick_binary() {
        let registry = ProcessorRegistry::builtin("/opt/sigthumb-missing/bin/convert");
        let magick = registry.get("magick").unwrap();
        let mut source = Source::from_bytes("rose.png", b"not really a png".to_vec());
        let mut out = Vec::new();

        let err = magick
            .process(&mut source, &mut out, "jpg", &Value::Null)
            .unwrap_err();

        let ProcessorError::Unavailable { binary, .. } = &err else {
            panic!("expected unavailable error, got {err:?}");
        };
        assert_eq!(binary, "/opt/sigthumb-missing/bin/convert");
    }
}
