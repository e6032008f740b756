//! Thumbnail handler

use attic_core::Classify;
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::Response,
};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::handlers::attachments::stream_response;
use crate::state::AppState;

/// Serve a thumbnail, generating it on first request
///
/// GET /attachments/:id/thumbnails/:name
///
/// Unknown specs and missing parents are 404. Anything else that keeps a
/// thumbnail from being produced falls back to the placeholder image.
pub async fn get_thumbnail(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> ApiResult<Response> {
    let spec = state
        .specs
        .find(&name)
        .ok_or_else(|| ApiError::not_found("Thumbnail spec", &name))?;

    let thumbnail = match state.thumbnails.get_or_create(&id, spec).await {
        Ok(Some(thumbnail)) => thumbnail,
        Ok(None) => return placeholder(&state),
        Err(e) if e.is_not_found() => return Err(e.into()),
        Err(e) => {
            warn!(id = %id, spec = %name, error = %e, "Thumbnail generation failed");
            return placeholder(&state);
        }
    };

    match state.attachments.open(&thumbnail.body_id).await {
        Ok((body, reader)) => stream_response(
            &body.content_type,
            body.content_length,
            reader,
            state.cache_max_age_secs,
        ),
        Err(e) => {
            warn!(id = %id, body_id = %thumbnail.body_id, error = %e, "Thumbnail body unreadable");
            placeholder(&state)
        }
    }
}

fn placeholder(state: &AppState) -> ApiResult<Response> {
    Response::builder()
        .header(header::CONTENT_TYPE, state.placeholder.content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from(state.placeholder.bytes().clone()))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
