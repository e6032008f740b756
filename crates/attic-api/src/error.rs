//! API error handling
//!
//! Every crate error classifies into an [`ErrorKind`]; the kind picks the
//! status code and the JSON body carries the error code and message.

use std::fmt::Display;

use attic_attachments::{ArchiveError, AttachmentError};
use attic_core::{Classify, ErrorKind};
use attic_thumbnails::ThumbnailError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    NotFound { resource: &'static str, id: String },
    Validation(String),
    BadRequest(String),
    Classified { kind: ErrorKind, message: String },
    Internal(String),
}

impl ApiError {
    pub fn not_found(resource: &'static str, id: impl Display) -> Self {
        ApiError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }

    fn classified<E: Classify + Display>(err: &E) -> Self {
        ApiError::Classified {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::Validation(_) | ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Classified { kind, .. } => *kind,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            other => status_for(other.kind()),
        }
    }
}

/// Status code for an error category
pub fn status_for(kind: ErrorKind) -> StatusCode {
    StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

impl From<AttachmentError> for ApiError {
    fn from(err: AttachmentError) -> Self {
        ApiError::classified(&err)
    }
}

impl From<ThumbnailError> for ApiError {
    fn from(err: ThumbnailError) -> Self {
        ApiError::classified(&err)
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        ApiError::classified(&err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.kind().error_code();
        let message = match self {
            ApiError::NotFound { resource, id } => format!("{} with id {} not found", resource, id),
            ApiError::Validation(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg,
            ApiError::Classified { message, .. } => message,
        };

        if status.is_server_error() {
            tracing::error!(%status, %message, "Request failed");
        }

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
