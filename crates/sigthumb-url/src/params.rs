//! Route parsing and cache keys.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Route pattern for thumbnail paths (relative to the mount prefix).
///
/// The identifier may itself contain `-`, but style, version, signature and
/// extension cannot, so the greedy identifier always yields the last three
/// dash-separated segments as style, version and signature.
static ROUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<identifier>[A-Za-z0-9_~/-]+)-(?P<style>[a-z0-9_]+)-(?P<version>[0-9]+)-(?P<signature>[a-z0-9]+)\.(?P<extension>[a-z0-9]+)$",
    )
    .unwrap()
});

/// Parameters of a thumbnail request, as they appear in the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    /// Escaped source identifier.
    pub identifier: String,
    /// Style name.
    pub style: String,
    /// Claimed style version (decimal string).
    pub version: String,
    /// Signature over the other four fields.
    pub signature: String,
    /// Output extension.
    pub extension: String,
}

impl RequestParams {
    /// Parse a request path such as `photos/cat-small-1-abc.jpg`.
    ///
    /// Returns `None` if the path does not match the route.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        let caps = ROUTE_PATTERN.captures(path)?;
        Some(Self {
            identifier: caps["identifier"].to_owned(),
            style: caps["style"].to_owned(),
            version: caps["version"].to_owned(),
            signature: caps["signature"].to_owned(),
            extension: caps["extension"].to_owned(),
        })
    }

    /// Cache key (and relative URL path) for these parameters.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        CacheKey(format!(
            "{}-{}-{}-{}.{}",
            self.identifier, self.style, self.version, self.signature, self.extension
        ))
    }
}

/// Relative path of a rendered thumbnail below the cache root.
///
/// The same string is the URL path below the mount prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
