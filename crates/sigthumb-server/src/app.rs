//! Router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::security;
use crate::state::AppState;

/// Create the application router with thumbnails mounted below `prefix`.
///
/// `prefix` has no trailing slash; `""` mounts at the root.
pub(crate) fn create_router(state: Arc<AppState>, prefix: &str) -> Router {
    Router::new()
        .route(
            &format!("{prefix}/{{*path}}"),
            get(handlers::thumbnails::get_thumbnail),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(security::content_type_options_layer()),
        )
        .with_state(state)
}
