//! Request validation.
//!
//! A request passes through three checks, in order:
//!
//! 1. the path matches the route ([`ValidationError::Route`])
//! 2. the signature matches a recomputed one ([`ValidationError::SignatureMismatch`])
//! 3. the style exists at the claimed version ([`ValidationError::UnknownStyle`],
//!    [`ValidationError::StaleVersion`])
//!
//! A valid signature only proves the parameters were correct when the URL was
//! issued; the style check catches styles that were removed or re-versioned
//! since. Callers should answer both style failures exactly like a missing
//! page so that a party without the key learns nothing about near misses.

use std::sync::Arc;

use crate::escape::{self, EscapeError};
use crate::params::{CacheKey, RequestParams};
use crate::signer::Signer;
use crate::style::{StyleRegistry, StyleSpec};

/// Reasons a thumbnail request is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The path does not match the thumbnail route.
    #[error("Path does not match the thumbnail route: {0}")]
    Route(String),
    /// The signature does not match the request parameters.
    #[error("Signature mismatch")]
    SignatureMismatch,
    /// The style is not (or no longer) configured.
    #[error("Unknown style: {0}")]
    UnknownStyle(String),
    /// The style exists but its version changed since the URL was issued.
    #[error("Stale version {requested} for style {style} (current: {current})")]
    StaleVersion {
        /// Style name.
        style: String,
        /// Version claimed by the URL.
        requested: String,
        /// Version currently configured.
        current: u32,
    },
}

impl ValidationError {
    /// Whether this rejection should look like a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        !matches!(self, Self::SignatureMismatch)
    }
}

/// A request that passed every check.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    params: RequestParams,
    style: Arc<StyleSpec>,
}

impl ValidatedRequest {
    /// The request parameters as parsed from the URL.
    #[must_use]
    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// The style the request renders with.
    #[must_use]
    pub fn style(&self) -> &StyleSpec {
        &self.style
    }

    /// Decode the identifier token back into the source identifier.
    pub fn identifier(&self) -> Result<String, EscapeError> {
        escape::unescape(&self.params.identifier)
    }

    /// Extension of the rendered output.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.params.extension
    }

    /// Cache key of the rendered output.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        self.params.cache_key()
    }
}

/// Validates thumbnail requests against a signer and a style registry.
#[derive(Clone)]
pub struct RequestValidator {
    signer: Signer,
    styles: Arc<dyn StyleRegistry>,
}

impl RequestValidator {
    /// Create a validator.
    pub fn new(signer: Signer, styles: Arc<dyn StyleRegistry>) -> Self {
        Self { signer, styles }
    }

    /// Parse and validate a request path (relative to the mount prefix).
    pub fn validate_path(&self, path: &str) -> Result<ValidatedRequest, ValidationError> {
        let params =
            RequestParams::parse(path).ok_or_else(|| ValidationError::Route(path.to_owned()))?;
        self.validate(params)
    }

    /// Validate parsed request parameters.
    pub fn validate(&self, params: RequestParams) -> Result<ValidatedRequest, ValidationError> {
        if !self.signer.verify(
            &params.signature,
            &params.identifier,
            &params.style,
            &params.version,
            &params.extension,
        ) {
            tracing::warn!(identifier = %params.identifier, style = %params.style, "Signature mismatch");
            return Err(ValidationError::SignatureMismatch);
        }

        let style = self
            .styles
            .style(&params.style)
            .ok_or_else(|| ValidationError::UnknownStyle(params.style.clone()))?;

        // Compared as strings: "01" is not version 1
        if params.version != style.version_string() {
            tracing::debug!(
                style = %params.style,
                requested = %params.version,
                current = style.version,
                "Stale style version"
            );
            return Err(ValidationError::StaleVersion {
                style: params.style,
                requested: params.version,
                current: style.version,
            });
        }

        Ok(ValidatedRequest { params, style })
    }
}

impl std::fmt::Debug for RequestValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestValidator")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Styles;

    fn styles(version: u32) -> Styles {
        Styles::new().with_style(StyleSpec::new("small", "image", "jpg", version))
    }

    fn validator(styles: Styles) -> RequestValidator {
        RequestValidator::new(Signer::new("secret"), Arc::new(styles))
    }

    fn signed_path(identifier: &str, style: &str, version: &str, extension: &str) -> String {
        let token = escape::escape(identifier);
        let sig = Signer::new("secret").sign(&token, style, version, extension);
        format!("{token}-{style}-{version}-{sig}.{extension}")
    }

    #[test]
    fn test_accepts_valid_request() {
        let path = signed_path("photos/cat.png", "small", "1", "jpg");
        let request = validator(styles(1)).validate_path(&path).unwrap();

        assert_eq!(request.identifier().unwrap(), "photos/cat.png");
        assert_eq!(request.params().identifier, "photos/cat~2epng");
        assert_eq!(request.style().name, "small");
        assert_eq!(request.extension(), "jpg");
        assert_eq!(request.cache_key().as_str(), path);
    }

    #[test]
    fn test_rejects_bad_route() {
        let err = validator(styles(1)).validate_path("nope.jpg").unwrap_err();
        assert_eq!(err, ValidationError::Route("nope.jpg".to_owned()));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rejects_tampered_signature() {
        let path = signed_path("photos/cat", "small", "1", "jpg");
        let tampered = path.replace("photos/cat", "photos/dog");

        let err = validator(styles(1)).validate_path(&tampered).unwrap_err();
        assert_eq!(err, ValidationError::SignatureMismatch);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_rejects_signature_from_other_key() {
        let token = escape::escape("photos/cat");
        let sig = Signer::new("other").sign(&token, "small", "1", "jpg");
        let path = format!("{token}-small-1-{sig}.jpg");

        let err = validator(styles(1)).validate_path(&path).unwrap_err();
        assert_eq!(err, ValidationError::SignatureMismatch);
    }

    #[test]
    fn test_signature_checked_before_style() {
        // Unknown style with a bad signature reports the signature
        let err = validator(Styles::new())
            .validate_path("cat-gone-1-abc.jpg")
            .unwrap_err();
        assert_eq!(err, ValidationError::SignatureMismatch);
    }

    #[test]
    fn test_rejects_removed_style() {
        let path = signed_path("photos/cat", "small", "1", "jpg");
        let err = validator(Styles::new()).validate_path(&path).unwrap_err();

        assert_eq!(err, ValidationError::UnknownStyle("small".to_owned()));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rejects_stale_version() {
        let path = signed_path("photos/cat", "small", "1", "jpg");
        let err = validator(styles(2)).validate_path(&path).unwrap_err();

        assert_eq!(
            err,
            ValidationError::StaleVersion {
                style: "small".to_owned(),
                requested: "1".to_owned(),
                current: 2,
            }
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_rejects_non_canonical_version() {
        let path = signed_path("photos/cat", "small", "01", "jpg");
        let err = validator(styles(1)).validate_path(&path).unwrap_err();
        assert!(matches!(err, ValidationError::StaleVersion { .. }));
    }
}
