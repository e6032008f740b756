//! Attachment handlers

use attic_attachments::{Attachment, AttachmentWithUrl, BlobReader, Upload};
use attic_core::{split_ids, Classify};
use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::error::{status_for, ApiError, ApiResult};
use crate::state::AppState;

/// Download path for an attachment's bytes
pub fn content_url(id: &str) -> String {
    format!("/attachments/{}/content", id)
}

fn with_url(attachment: Attachment) -> AttachmentWithUrl {
    let url = content_url(&attachment.id);
    AttachmentWithUrl::new(attachment, url)
}

/// Stream a blob with client caching headers
pub(crate) fn stream_response(
    content_type: &str,
    content_length: u64,
    reader: BlobReader,
    max_age_secs: u64,
) -> ApiResult<Response> {
    let expires = i64::try_from(max_age_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|age| Utc::now().checked_add_signed(age))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::CACHE_CONTROL, format!("max-age={}", max_age_secs))
        .header(
            header::EXPIRES,
            expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        )
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub error: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Upload one or more files
///
/// POST /attachments
///
/// Form fields `OwnerId` (required), `GroupId` and `Category`; every part
/// with a filename is stored as an attachment, and at least one is required.
pub async fn upload_attachments(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let mut owner_id = String::new();
    let mut group_id = String::new();
    let mut category = String::new();
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if let Some(filename) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            if filename.is_empty() {
                continue;
            }
            uploads.push(Upload {
                filename,
                content_type,
                data,
            });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        match name.as_str() {
            "OwnerId" => owner_id = value,
            "GroupId" => group_id = value,
            "Category" => category = value,
            _ => {}
        }
    }

    if owner_id.is_empty() {
        return Err(ApiError::validation("OwnerId is required"));
    }
    if uploads.is_empty() {
        return Err(ApiError::validation("No attachments uploaded"));
    }

    match state
        .attachments
        .create_many(uploads, &owner_id, &group_id, &category)
        .await
    {
        Ok(attachments) => Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                error: None,
                attachments,
            }),
        )),
        Err(err) => {
            warn!(error = %err, created = err.created.len(), "Upload failed");
            let status = status_for(err.kind());
            let message = err.to_string();
            let mut attachments = err.created;
            attachments.push(err.failed);
            Ok((
                status,
                Json(UploadResponse {
                    error: Some(message),
                    attachments,
                }),
            ))
        }
    }
}

/// Get attachment metadata
///
/// GET /attachments/:id
pub async fn get_attachment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AttachmentWithUrl>> {
    let attachment = state.attachments.fetch(&id).await?;
    Ok(Json(with_url(attachment)))
}

/// Stream attachment bytes
///
/// GET /attachments/:id/content
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let (attachment, reader) = state.attachments.open(&id).await?;
    stream_response(
        &attachment.content_type,
        attachment.content_length,
        reader,
        state.cache_max_age_secs,
    )
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub group_id: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub attachment: Attachment,
    pub deleted: bool,
}

/// Drop the caller's reference to an attachment
///
/// DELETE /attachments/:id?owner_id=&group_id=
///
/// Both parameters are optional. Without an owner a single-owner attachment
/// is deleted outright and a shared one only loses its group references.
pub async fn delete_attachment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Json<DeleteResponse>> {
    let outcome = state
        .thumbnails
        .delete_attachment(&id, &params.owner_id, &params.group_id)
        .await?;

    Ok(Json(DeleteResponse {
        attachment: outcome.attachment,
        deleted: outcome.fully_deleted,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub owner_ids: Option<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentCollection {
    pub total: u64,
    pub count: usize,
    pub attachments: Vec<AttachmentWithUrl>,
}

/// List attachments by owners or by group
///
/// GET /attachments?owner_ids=a,b
/// GET /attachments?group_id=g
pub async fn list_attachments(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let (attachments, total) = if let Some(raw) = params.owner_ids.as_deref() {
        let owner_ids = split_ids(raw);
        if owner_ids.is_empty() {
            return Err(ApiError::validation("owner_ids is empty"));
        }
        let attachments = state.attachments.list_for_owners(&owner_ids).await?;
        let total = state.attachments.count_for_owners(&owner_ids).await?;
        (attachments, total)
    } else if let Some(group_id) = params.group_id.as_deref() {
        let attachments = state.attachments.list_for_group(group_id).await?;
        let total = attachments.len() as u64;
        (attachments, total)
    } else {
        return Err(ApiError::validation("owner_ids or group_id is required"));
    };

    let attachments: Vec<AttachmentWithUrl> = attachments.into_iter().map(with_url).collect();

    Ok(Json(AttachmentCollection {
        total,
        count: attachments.len(),
        attachments,
    }))
}
