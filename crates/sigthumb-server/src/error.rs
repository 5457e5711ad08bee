//! Error types for the HTTP server.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sigthumb_render::RenderError;
use sigthumb_url::ValidationError;

/// Body shared by every not-found answer, so near misses are indistinguishable.
const NOT_FOUND_MESSAGE: &str = "Not found";

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The request failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Rendering or caching failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// I/O error while serving a cached file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking render task panicked or was cancelled.
    #[error("Render task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(ValidationError::SignatureMismatch) => {
                (StatusCode::FORBIDDEN, "Invalid signature".to_owned())
            }
            Self::Validation(_) => (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE.to_owned()),
            Self::Render(e) if e.is_not_found() => {
                tracing::debug!("Source not found: {e}");
                (StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE.to_owned())
            }
            Self::Render(e) if e.is_busy() => {
                tracing::warn!("Render busy: {e}");
                let body = json!({"error": "Thumbnail is being rendered, retry later"});
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    [(header::RETRY_AFTER, "1")],
                    axum::Json(body),
                )
                    .into_response();
            }
            Self::Render(e) => {
                tracing::error!("Render failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::Io(e) => {
                tracing::error!("Failed to read cached thumbnail: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::Task(e) => {
                tracing::error!("Render task failed: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Render task failed".to_owned(),
                )
            }
        };

        (status, axum::Json(json!({"error": message}))).into_response()
    }
}

/// Error raised while assembling the server from configuration.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// A style references a processor that is not registered.
    #[error("Style {style} uses unknown processor {processor:?} (available: {available})")]
    UnknownProcessor {
        /// Style name.
        style: String,
        /// Processor the style asked for.
        processor: String,
        /// Registered processor names.
        available: String,
    },
}
