//! Signed thumbnail URL generation.

use std::path::Path;
use std::sync::Arc;

use sigthumb_url::{RequestParams, Signer, StyleRegistry, escape};

use crate::resolver::{ResolveError, Resolver};

/// URL generation failure.
#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    /// No style with this name is configured.
    #[error("Unknown style: {0}")]
    UnknownStyle(String),

    /// The object has no identifier.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The identifier is empty and cannot appear in a URL.
    #[error("Empty identifier")]
    EmptyIdentifier,
}

/// Builds signed thumbnail URLs for source objects.
#[derive(Clone)]
pub struct UrlBuilder {
    signer: Signer,
    styles: Arc<dyn StyleRegistry>,
    resolver: Arc<dyn Resolver>,
    prefix: String,
}

impl UrlBuilder {
    /// Create a builder producing URLs below `prefix` (e.g. `/thumbs`).
    pub fn new(
        signer: Signer,
        styles: Arc<dyn StyleRegistry>,
        resolver: Arc<dyn Resolver>,
        prefix: impl Into<String>,
    ) -> Self {
        let prefix: String = prefix.into();
        Self {
            signer,
            styles,
            resolver,
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }

    /// Signed URL of `object` rendered with `style`.
    pub fn image_url(&self, object: &Path, style: &str) -> Result<String, UrlError> {
        let identifier = self.resolver.identify(object)?;
        self.identifier_url(&identifier, style)
    }

    /// Signed URL for an identifier the resolver already produced.
    pub fn identifier_url(&self, identifier: &str, style: &str) -> Result<String, UrlError> {
        let spec = self
            .styles
            .style(style)
            .ok_or_else(|| UrlError::UnknownStyle(style.to_owned()))?;
        if identifier.is_empty() {
            return Err(UrlError::EmptyIdentifier);
        }

        let token = escape::escape(identifier);
        let version = spec.version_string();
        let signature = self.signer.sign(&token, style, &version, &spec.extension);
        let params = RequestParams {
            identifier: token,
            style: style.to_owned(),
            version,
            signature,
            extension: spec.extension.clone(),
        };
        Ok(format!("{}/{}", self.prefix, params.cache_key()))
    }
}

impl std::fmt::Debug for UrlBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlBuilder")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
