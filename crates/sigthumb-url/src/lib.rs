//! Signed thumbnail URLs for sigthumb.
//!
//! A thumbnail URL carries everything needed to render the image it names:
//!
//! ```text
//! <identifier>-<style>-<version>-<signature>.<extension>
//! ```
//!
//! The signature is an HMAC over the other four components, so the URL (and
//! the cache filename derived from it) cannot be forged without the secret
//! key. No server-side index of issued URLs is needed.
//!
//! # Modules
//!
//! - [`escape`]: reversible escaping of source identifiers into URL/path-safe tokens
//! - [`Signer`]: HMAC-SHA1 signatures rendered as lowercase base32
//! - [`StyleRegistry`] / [`Styles`]: named rendering styles with versions
//! - [`RequestParams`]: route parsing and cache key construction
//! - [`RequestValidator`]: signature and style version checks
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sigthumb_url::{RequestParams, RequestValidator, Signer, StyleSpec, Styles, escape};
//!
//! let styles = Styles::new().with_style(StyleSpec::new("small", "image", "jpg", 1));
//! let signer = Signer::new("secret");
//!
//! let token = escape::escape("photos/cat.png");
//! let signature = signer.sign(&token, "small", "1", "jpg");
//! let path = format!("{token}-small-1-{signature}.jpg");
//!
//! let validator = RequestValidator::new(signer, Arc::new(styles));
//! let request = validator.validate_path(&path).unwrap();
//! assert_eq!(request.identifier().unwrap(), "photos/cat.png");
//! ```

pub mod escape;
mod params;
mod signer;
mod style;
mod validator;

pub use escape::EscapeError;
pub use params::{CacheKey, RequestParams};
pub use signer::Signer;
pub use style::{StyleRegistry, StyleSpec, Styles, is_valid_extension, is_valid_style_name};
pub use validator::{RequestValidator, ValidatedRequest, ValidationError};
