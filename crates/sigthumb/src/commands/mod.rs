//! CLI command implementations.

pub(crate) mod serve;
pub(crate) mod url;

pub(crate) use serve::ServeArgs;
pub(crate) use url::UrlArgs;
