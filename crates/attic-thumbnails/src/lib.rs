//! # attic-thumbnails
//!
//! On-demand resized derivatives of image attachments.
//!
//! - [`ThumbnailSpec`] names a target size; [`ThumbnailSpecs`] is the
//!   configured registry
//! - [`calculate_dimensions`] and [`resize`] implement the aspect-preserving
//!   resize (never upscaling)
//! - [`ThumbnailCache`] generates each `(parent, spec)` thumbnail once and
//!   removes derived attachments when their parent is deleted

pub mod cache;
pub mod error;
pub mod model;
pub mod placeholder;
pub mod resize;
pub mod spec;
pub mod store;

pub use cache::ThumbnailCache;
pub use error::{ThumbnailError, ThumbnailResult};
pub use model::Thumbnail;
pub use placeholder::Placeholder;
pub use resize::{calculate_dimensions, resize, Resized, JPEG_QUALITY};
pub use spec::{ThumbnailSpec, ThumbnailSpecs};
pub use store::{MemoryThumbnailStore, ThumbnailStore};
