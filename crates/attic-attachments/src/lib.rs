//! # attic-attachments
//!
//! Attachment lifecycle for Attic.
//!
//! ## Features
//!
//! - Blob storage abstraction (in-memory, local filesystem)
//! - Metadata store abstraction with an in-memory adapter
//! - Reference-counted deletes for attachments shared by several owners
//! - Cross-store migration that keeps attachment ids
//! - Zip archive bundling with filename collision handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use attic_attachments::{AttachmentService, CreateAttachmentParams, MemoryBlobStore, MemoryMetaStore};
//! use std::sync::Arc;
//!
//! let service = AttachmentService::new(
//!     Arc::new(MemoryMetaStore::new()),
//!     Arc::new(MemoryBlobStore::new()),
//! );
//!
//! let attachment = service
//!     .create(
//!         CreateAttachmentParams::new("document.pdf", owner_id).group(group_id),
//!         bytes::Bytes::from(file_data),
//!     )
//!     .await?;
//! ```

pub mod archive;
pub mod meta;
pub mod model;
pub mod probe;
pub mod service;
pub mod storage;

pub use archive::{plan_entries, ArchiveBundler, ArchiveEntry, ArchiveError, ArchiveSummary};
pub use meta::{MemoryMetaStore, MetaError, MetaResult, MetaStore};
pub use model::{
    is_image_content_type, Attachment, AttachmentWithUrl, CreateAttachmentParams, DeleteOutcome,
    ImageDimensions, Upload, IMAGE_CONTENT_TYPES,
};
pub use probe::probe_dimensions;
pub use service::{
    migrate, AttachmentError, AttachmentResult, AttachmentService, BatchUploadError,
};
pub use storage::{
    content_hash, generate_blob_id, BlobReader, BlobReceipt, BlobStore, LocalBlobStore,
    MemoryBlobStore, StorageError, StorageResult,
};
