//! Thumbnail errors

use attic_attachments::{AttachmentError, MetaError};
use attic_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("Invalid thumbnail spec: {0}")]
    InvalidSpec(String),
    #[error("Unknown thumbnail spec: {0}")]
    UnknownSpec(String),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to encode image: {0}")]
    Encode(String),
    #[error("Failed to read placeholder {path}: {source}")]
    Placeholder {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error("Thumbnail store {operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: MetaError,
    },
    #[error("Resize task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ThumbnailError {
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(MetaError) -> Self {
        move |source| ThumbnailError::Store { operation, source }
    }
}

impl Classify for ThumbnailError {
    fn kind(&self) -> ErrorKind {
        match self {
            ThumbnailError::InvalidSpec(_) => ErrorKind::Configuration,
            ThumbnailError::UnknownSpec(_) => ErrorKind::NotFound,
            ThumbnailError::Decode(_) => ErrorKind::Decode,
            ThumbnailError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ThumbnailError::Attachment(e) => e.kind(),
            ThumbnailError::Store { source, .. } => source.kind(),
            ThumbnailError::Placeholder { .. } => ErrorKind::Configuration,
            ThumbnailError::Encode(_) | ThumbnailError::Join(_) => ErrorKind::Internal,
        }
    }
}

pub type ThumbnailResult<T> = Result<T, ThumbnailError>;
