//! Attachment Service
//!
//! Orchestrates blob storage and metadata for attachments. Ownership is
//! reference counted: an attachment held by several owners survives until
//! the last of them deletes it.

use std::sync::Arc;

use attic_core::{AttachmentId, Classify, ErrorKind};
use bytes::Bytes;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::{debug, info, instrument, warn};

use crate::meta::{MetaError, MetaStore};
use crate::model::{Attachment, CreateAttachmentParams, DeleteOutcome, Upload};
use crate::storage::{BlobReader, BlobReceipt, BlobStore, StorageError};

/// Service errors
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Attachment not found: {0}")]
    NotFound(AttachmentId),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Blob store {operation} failed for {id}: {source}")]
    Storage {
        operation: &'static str,
        id: String,
        #[source]
        source: StorageError,
    },
    #[error("Metadata store {operation} failed for {id}: {source}")]
    Meta {
        operation: &'static str,
        id: String,
        #[source]
        source: MetaError,
    },
}

impl Classify for AttachmentError {
    fn kind(&self) -> ErrorKind {
        match self {
            AttachmentError::NotFound(_) => ErrorKind::NotFound,
            AttachmentError::Validation(_) => ErrorKind::Validation,
            AttachmentError::Storage { source, .. } => source.kind(),
            AttachmentError::Meta { source, .. } => source.kind(),
        }
    }
}

impl AttachmentError {
    fn storage(operation: &'static str, id: &str, source: StorageError) -> Self {
        match source {
            StorageError::NotFound(_) => AttachmentError::NotFound(id.to_string()),
            source => AttachmentError::Storage {
                operation,
                id: id.to_string(),
                source,
            },
        }
    }

    fn meta(operation: &'static str, id: &str, source: MetaError) -> Self {
        AttachmentError::Meta {
            operation,
            id: id.to_string(),
            source,
        }
    }
}

pub type AttachmentResult<T> = Result<T, AttachmentError>;

/// A batch upload stopped at its first hard failure
#[derive(Debug, Error)]
#[error("Batch upload stopped at {}: {source}", .failed.filename)]
pub struct BatchUploadError {
    /// Attachments written before the failure
    pub created: Vec<Attachment>,
    /// The upload that failed, with `last_error` set
    pub failed: Attachment,
    #[source]
    pub source: AttachmentError,
}

impl Classify for BatchUploadError {
    fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Attachment service
#[derive(Clone)]
pub struct AttachmentService {
    meta: Arc<dyn MetaStore>,
    blobs: Arc<dyn BlobStore>,
}

impl AttachmentService {
    pub fn new(meta: Arc<dyn MetaStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { meta, blobs }
    }

    pub fn meta_store(&self) -> &Arc<dyn MetaStore> {
        &self.meta
    }

    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Create an attachment from uploaded data
    #[instrument(skip(self, data), fields(filename = %params.filename, owner = %params.owner_id))]
    pub async fn create(
        &self,
        params: CreateAttachmentParams,
        data: Bytes,
    ) -> AttachmentResult<Attachment> {
        if params.owner_id.is_empty() {
            return Err(AttachmentError::Validation("owner id is required".into()));
        }
        if params.filename.is_empty() {
            return Err(AttachmentError::Validation("filename is required".into()));
        }

        let content_type = params.resolved_content_type();
        let receipt = self
            .blobs
            .put(&params.filename, &content_type, data)
            .await
            .map_err(|e| AttachmentError::storage("put", &params.filename, e))?;

        let attachment = Attachment::from_receipt(receipt, params.filename)
            .owned_by(params.owner_id, params.group_id)
            .with_category(params.category);

        if let Err(e) = self.meta.put(&attachment).await {
            if let Err(cleanup) = self.blobs.delete(&attachment.id).await {
                warn!(
                    id = %attachment.id,
                    error = %cleanup,
                    "Failed to remove blob after metadata write failed"
                );
            }
            return Err(AttachmentError::meta("put", &attachment.id, e));
        }

        info!(
            id = %attachment.id,
            size = attachment.content_length,
            content_type = %attachment.content_type,
            "Attachment created"
        );

        Ok(attachment)
    }

    /// Store bytes derived from `parent` (a resized image, say) as a new
    /// attachment sharing the parent's owners and groups. The record is
    /// marked with its parent and removed only through [`Self::purge`].
    #[instrument(skip(self, parent, data), fields(parent = %parent.id))]
    pub async fn create_derived(
        &self,
        parent: &Attachment,
        content_type: &str,
        data: Bytes,
    ) -> AttachmentResult<Attachment> {
        let receipt = self
            .blobs
            .put(&parent.filename, content_type, data)
            .await
            .map_err(|e| AttachmentError::storage("put", &parent.id, e))?;

        let mut derived = Attachment::from_receipt(receipt, parent.filename.clone())
            .with_category(parent.category.clone());
        derived.owner_ids = parent.owner_ids.clone();
        derived.group_ids = parent.group_ids.clone();
        derived.derived_from = Some(parent.id.clone());

        if let Err(e) = self.meta.put(&derived).await {
            if let Err(cleanup) = self.blobs.delete(&derived.id).await {
                warn!(id = %derived.id, error = %cleanup, "Failed to remove derived blob");
            }
            return Err(AttachmentError::meta("put", &derived.id, e));
        }

        debug!(id = %derived.id, size = derived.content_length, "Derived attachment stored");
        Ok(derived)
    }

    /// Create attachments in order, stopping at the first failure
    #[instrument(skip(self, uploads), fields(count = uploads.len()))]
    pub async fn create_many(
        &self,
        uploads: Vec<Upload>,
        owner_id: &str,
        group_id: &str,
        category: &str,
    ) -> Result<Vec<Attachment>, BatchUploadError> {
        let mut created = Vec::with_capacity(uploads.len());

        for upload in uploads {
            let mut params = CreateAttachmentParams::new(upload.filename, owner_id)
                .group(group_id)
                .category(category);
            params.content_type = upload.content_type;

            let length = upload.data.len() as u64;
            match self.create(params.clone(), upload.data).await {
                Ok(attachment) => created.push(attachment),
                Err(source) => {
                    let receipt = BlobReceipt {
                        id: String::new(),
                        length,
                        hash: String::new(),
                        content_type: params.resolved_content_type(),
                        width: 0,
                        height: 0,
                    };
                    let mut failed = Attachment::from_receipt(receipt, params.filename)
                        .owned_by(params.owner_id, params.group_id)
                        .with_category(params.category);
                    failed.last_error = Some(source.to_string());

                    return Err(BatchUploadError {
                        created,
                        failed,
                        source,
                    });
                }
            }
        }

        Ok(created)
    }

    /// Get an attachment by ID
    pub async fn fetch(&self, id: &str) -> AttachmentResult<Attachment> {
        self.meta
            .by_id(id)
            .await
            .map_err(|e| AttachmentError::meta("by_id", id, e))?
            .ok_or_else(|| AttachmentError::NotFound(id.to_string()))
    }

    /// Whether a metadata record exists for `id`
    pub async fn exists(&self, id: &str) -> AttachmentResult<bool> {
        self.meta
            .by_id(id)
            .await
            .map(|found| found.is_some())
            .map_err(|e| AttachmentError::meta("by_id", id, e))
    }

    pub async fn fetch_many(&self, ids: &[AttachmentId]) -> AttachmentResult<Vec<Attachment>> {
        self.meta
            .by_ids(ids)
            .await
            .map_err(|e| AttachmentError::meta("by_ids", &ids.join(","), e))
    }

    pub async fn list_for_owners(&self, owner_ids: &[String]) -> AttachmentResult<Vec<Attachment>> {
        self.meta
            .by_owner_ids(owner_ids)
            .await
            .map_err(|e| AttachmentError::meta("by_owner_ids", &owner_ids.join(","), e))
    }

    pub async fn list_for_group(&self, group_id: &str) -> AttachmentResult<Vec<Attachment>> {
        self.meta
            .by_group_id(group_id)
            .await
            .map_err(|e| AttachmentError::meta("by_group_id", group_id, e))
    }

    pub async fn count_for_owners(&self, owner_ids: &[String]) -> AttachmentResult<u64> {
        self.meta
            .count_by_owner_ids(owner_ids)
            .await
            .map_err(|e| AttachmentError::meta("count_by_owner_ids", &owner_ids.join(","), e))
    }

    /// Stream the bytes of an attachment into `sink`
    pub async fn copy_bytes(
        &self,
        id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> AttachmentResult<u64> {
        self.blobs
            .copy_out(id, sink)
            .await
            .map_err(|e| AttachmentError::storage("copy_out", id, e))
    }

    /// Record plus an owned read handle, for streaming responses
    pub async fn open(&self, id: &str) -> AttachmentResult<(Attachment, BlobReader)> {
        let attachment = self.fetch(id).await?;
        let reader = self
            .blobs
            .open(id)
            .await
            .map_err(|e| AttachmentError::storage("open", id, e))?;
        Ok((attachment, reader))
    }

    /// Read the full bytes of an attachment
    pub async fn read_all(&self, id: &str) -> AttachmentResult<Bytes> {
        self.blobs
            .get(id)
            .await
            .map_err(|e| AttachmentError::storage("get", id, e))
    }

    /// Drop one owner's reference; the blob goes with the last one
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        id: &str,
        owner_id: &str,
        group_id: &str,
    ) -> AttachmentResult<DeleteOutcome> {
        let mut attachment = self.fetch(id).await?;

        if let Some(ref parent) = attachment.derived_from {
            return Err(AttachmentError::Validation(format!(
                "{} is derived from {} and is removed with it",
                id, parent
            )));
        }

        if attachment.is_shared() {
            attachment.owner_ids.remove(owner_id);
            if group_id.is_empty() {
                attachment.group_ids.clear();
            } else {
                attachment.group_ids.remove(group_id);
            }

            self.meta
                .put(&attachment)
                .await
                .map_err(|e| AttachmentError::meta("put", id, e))?;

            info!(id, remaining = attachment.owner_ids.len(), "Owner reference removed");
            return Ok(DeleteOutcome {
                attachment,
                fully_deleted: false,
            });
        }

        self.remove_blob(id).await?;
        self.meta
            .remove(id)
            .await
            .map_err(|e| AttachmentError::meta("remove", id, e))?;

        info!(id, "Attachment deleted");
        Ok(DeleteOutcome {
            attachment,
            fully_deleted: true,
        })
    }

    /// Remove blob and metadata regardless of owners; returns whether a
    /// metadata record existed
    #[instrument(skip(self))]
    pub async fn purge(&self, id: &str) -> AttachmentResult<bool> {
        self.remove_blob(id).await?;
        let existed = self
            .meta
            .remove(id)
            .await
            .map_err(|e| AttachmentError::meta("remove", id, e))?;

        debug!(id, existed, "Attachment purged");
        Ok(existed)
    }

    /// Move an attachment into another service's stores, keeping its id
    pub async fn migrate_to(
        &self,
        id: &str,
        dest: &AttachmentService,
    ) -> AttachmentResult<Attachment> {
        let attachment = self.fetch(id).await?;
        migrate(
            &attachment,
            self.blobs.as_ref(),
            dest.blobs.as_ref(),
            dest.meta.as_ref(),
        )
        .await
    }

    async fn remove_blob(&self, id: &str) -> AttachmentResult<()> {
        match self.blobs.delete(id).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound(_)) => {
                warn!(id, store = self.blobs.name(), "Blob already gone");
                Ok(())
            }
            Err(e) => Err(AttachmentError::storage("delete", id, e)),
        }
    }
}

/// Copy an attachment's bytes and metadata into another pair of stores.
///
/// The blob is written before the metadata. When the source blob is
/// missing nothing is written.
#[instrument(skip_all, fields(id = %attachment.id, from = source.name(), to = dest.name()))]
pub async fn migrate(
    attachment: &Attachment,
    source: &dyn BlobStore,
    dest: &dyn BlobStore,
    dest_meta: &dyn MetaStore,
) -> AttachmentResult<Attachment> {
    let receipt = source
        .copy_to_store(attachment, dest)
        .await
        .map_err(|e| AttachmentError::storage("copy_to_store", &attachment.id, e))?;

    let mut migrated = attachment.clone();
    migrated.last_error = None;
    if migrated.content_hash.is_empty() {
        migrated.content_hash = receipt.hash;
    }
    if migrated.content_length == 0 {
        migrated.content_length = receipt.length;
    }
    if migrated.dimensions().is_none() && receipt.width > 0 && receipt.height > 0 {
        migrated.width = receipt.width;
        migrated.height = receipt.height;
    }

    dest_meta
        .put(&migrated)
        .await
        .map_err(|e| AttachmentError::meta("put", &migrated.id, e))?;

    info!("Attachment migrated");
    Ok(migrated)
}
