//! Application state.
//!
//! Shared state for all request handlers.

use sigthumb_render::RenderPipeline;
use sigthumb_url::RequestValidator;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Signature and style checks.
    pub(crate) validator: RequestValidator,
    /// Renders missing thumbnails into the cache.
    pub(crate) pipeline: RenderPipeline,
}
