//! Error taxonomy shared by all Attic crates
//!
//! Each crate keeps its own `thiserror` enum; every variant classifies into
//! one [`ErrorKind`], which is what the HTTP layer maps to a status code.

use serde::Serialize;

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Blob or metadata absent
    NotFound,
    /// Missing required owner, spec or filename
    Validation,
    /// A store call failed
    Backend,
    /// Image bytes could not be decoded (or re-encoded)
    Decode,
    /// Image format is recognized but not handled
    UnsupportedFormat,
    /// Invalid static configuration, e.g. a thumbnail spec without bounds
    Configuration,
    /// Anything else (task join failures and the like)
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this category
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation => 422,
            ErrorKind::Backend => 502,
            ErrorKind::Decode | ErrorKind::UnsupportedFormat => 415,
            ErrorKind::Configuration | ErrorKind::Internal => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation_failed",
            ErrorKind::Backend => "backend_error",
            ErrorKind::Decode => "decode_error",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Configuration => "configuration_error",
            ErrorKind::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.error_code())
    }
}

/// Implemented by every crate-level error enum
pub trait Classify {
    fn kind(&self) -> ErrorKind;

    fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
