//! Archive download

use std::collections::HashMap;
use std::io::{Seek, SeekFrom};

use attic_attachments::Attachment;
use attic_core::split_ids;
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::Response,
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ArchiveParams {
    #[serde(default)]
    pub ids: String,
}

/// Download attachments as one zip file
///
/// GET /archives?ids=a,b
///
/// Entries are written in the order the ids are given; unknown ids are
/// skipped. The zip is spooled to an unnamed temporary file and streamed
/// from there.
pub async fn download_archive(
    State(state): State<AppState>,
    Query(params): Query<ArchiveParams>,
) -> ApiResult<Response> {
    let ids = split_ids(&params.ids);
    if ids.is_empty() {
        return Err(ApiError::validation("ids is required"));
    }

    let mut found: HashMap<String, Attachment> = state
        .attachments
        .fetch_many(&ids)
        .await?
        .into_iter()
        .map(|a| (a.id.clone(), a))
        .collect();
    let attachments: Vec<Attachment> = ids.iter().filter_map(|id| found.remove(id)).collect();
    if attachments.is_empty() {
        return Err(ApiError::not_found("Attachment", params.ids));
    }

    let spool = tempfile::tempfile().map_err(spool_error)?;
    let (summary, mut spool) = state.bundler.build_archive(&attachments, spool).await?;
    let size = spool.seek(SeekFrom::End(0)).map_err(spool_error)?;
    spool.seek(SeekFrom::Start(0)).map_err(spool_error)?;

    info!(
        entries = summary.names.len(),
        skipped = summary.skipped,
        size,
        "Archive built"
    );

    let file = tokio::fs::File::from_std(spool);
    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"attachments.zip\"",
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

fn spool_error(e: std::io::Error) -> ApiError {
    ApiError::internal(format!("Archive spool failed: {}", e))
}
