//! CLI error types.

use sigthumb_config::ConfigError;
use sigthumb_render::UrlError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Url(#[from] UrlError),

    #[error("{0}")]
    Server(String),
}
