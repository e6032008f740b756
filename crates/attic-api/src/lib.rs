//! # attic-api
//!
//! HTTP surface for Attic: upload, metadata, streaming download,
//! reference-counted delete, thumbnails and zip archives.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
