//! Thumbnail endpoint.
//!
//! Validates the signed path, renders the thumbnail on a cache miss and
//! serves the cached file with [`ServeFile`].

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::ServerError;
use crate::state::AppState;

/// Thumbnail URLs never change content, so caches may keep them forever.
const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Handle GET {prefix}/{path}.
pub(crate) async fn get_thumbnail(
    Path(path): Path<String>,
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ServerError> {
    let thumbnail = state.validator.validate_path(&path)?;

    // The signature covers every input of the render
    let etag = format!("\"{}\"", thumbnail.params().signature);
    if let Some(if_none_match) = request.headers().get(header::IF_NONE_MATCH)
        && if_none_match.as_bytes() == etag.as_bytes()
    {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let mime = mime_guess::from_ext(thumbnail.extension()).first_or_octet_stream();

    let file = match state.pipeline.cached(&thumbnail)? {
        Some(file) => file,
        None => {
            let state = Arc::clone(&state);
            tokio::task::spawn_blocking(move || state.pipeline.render(&thumbnail)).await??
        }
    };

    let Ok(response) = ServeFile::new_with_mime(file, &mime).oneshot(request).await;
    let response = response.map(Body::new);

    Ok((
        [
            (header::CACHE_CONTROL, CACHE_CONTROL.to_owned()),
            (header::ETAG, etag),
        ],
        response,
    )
        .into_response())
}
