//! Blob Storage
//!
//! The [`BlobStore`] capability trait plus the in-memory and local
//! filesystem adapters. The store owns id assignment: `put` hands out a
//! fresh id, `store` writes under an id chosen by the caller (migration).

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use attic_core::{Classify, ErrorKind};
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::model::Attachment;
use crate::probe::probe_dimensions;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid blob id: {0}")]
    InvalidId(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl Classify for StorageError {
    fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::InvalidId(_) => ErrorKind::Validation,
            StorageError::IoError(_) | StorageError::BackendError(_) => ErrorKind::Backend,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// What the store learned while writing a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReceipt {
    pub id: String,
    pub length: u64,
    /// Hex MD5 digest
    pub hash: String,
    pub content_type: String,
    /// 0 when not probed
    pub width: u32,
    /// 0 when not probed
    pub height: u32,
}

impl BlobReceipt {
    /// Digest, length and (for recognized image types) header dimensions
    pub fn compute(id: &str, content_type: &str, data: &[u8]) -> Self {
        let (width, height) = probe_dimensions(content_type, data).unwrap_or((0, 0));
        Self {
            id: id.to_string(),
            length: data.len() as u64,
            hash: content_hash(data),
            content_type: content_type.to_string(),
            width,
            height,
        }
    }
}

/// Owned read handle; dropping it releases the underlying resource
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Blob store trait - unified interface for storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write data under a caller-chosen id, replacing any previous blob
    async fn store(
        &self,
        id: &str,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<BlobReceipt>;

    /// Write data under a freshly assigned id
    async fn put(
        &self,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<BlobReceipt> {
        let id = generate_blob_id();
        self.store(&id, filename, content_type, data).await
    }

    /// Read the whole blob into memory
    async fn get(&self, id: &str) -> StorageResult<Bytes>;

    /// Open a streaming read handle
    async fn open(&self, id: &str) -> StorageResult<BlobReader>;

    /// Delete a blob; `NotFound` when it is already gone
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Check if a blob exists
    async fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Stream a blob into `sink`, returning the number of bytes copied
    async fn copy_out(
        &self,
        id: &str,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> StorageResult<u64> {
        let mut reader = self.open(id).await?;
        let copied = tokio::io::copy(&mut reader, sink).await?;
        sink.flush().await?;
        Ok(copied)
    }

    /// Copy an attachment's blob into another store under the same id
    async fn copy_to_store(
        &self,
        attachment: &Attachment,
        dest: &dyn BlobStore,
    ) -> StorageResult<BlobReceipt> {
        let data = self.get(&attachment.id).await?;
        dest.store(
            &attachment.id,
            &attachment.filename,
            &attachment.content_type,
            data,
        )
        .await
    }

    /// Get storage name for logging
    fn name(&self) -> &str;
}

/// Local filesystem storage
pub struct LocalBlobStore {
    /// Root directory for storage
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a new local storage
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Create the root directory if needed
    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Resolve an id to a full path, sharded by the id's first two characters
    fn resolve_path(&self, id: &str) -> StorageResult<PathBuf> {
        if id.len() < 3 || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(StorageError::InvalidId(id.to_string()));
        }

        Ok(self.root.join(&id[..2]).join(id))
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn open_file(&self, id: &str) -> StorageResult<fs::File> {
        let path = self.resolve_path(id)?;
        match fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, data), fields(storage = "local"))]
    async fn store(
        &self,
        id: &str,
        filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<BlobReceipt> {
        let path = self.resolve_path(id)?;
        self.ensure_parent(&path).await?;

        let receipt = BlobReceipt::compute(id, content_type, &data);

        // Write aside and rename so readers never see a partial blob
        let partial = path.with_extension("partial");
        let mut file = fs::File::create(&partial).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&partial, &path).await?;

        debug!(path = ?path, size = receipt.length, "Blob stored");

        Ok(receipt)
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn get(&self, id: &str) -> StorageResult<Bytes> {
        let path = self.resolve_path(id)?;
        match fs::read(&path).await {
            Ok(buffer) => Ok(Bytes::from(buffer)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, id: &str) -> StorageResult<BlobReader> {
        let file = self.open_file(id).await?;
        Ok(Box::new(file))
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.resolve_path(id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "Blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let path = self.resolve_path(id)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn name(&self) -> &str {
        "local"
    }
}

struct StoredBlob {
    data: Bytes,
    content_type: String,
}

/// In-memory storage
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
        }
    }

    /// Number of blobs held
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Content type recorded at write time
    pub async fn content_type(&self, id: &str) -> Option<String> {
        let blobs = self.blobs.read().await;
        blobs.get(id).map(|b| b.content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(
        &self,
        id: &str,
        _filename: &str,
        content_type: &str,
        data: Bytes,
    ) -> StorageResult<BlobReceipt> {
        let receipt = BlobReceipt::compute(id, content_type, &data);

        let mut blobs = self.blobs.write().await;
        blobs.insert(
            id.to_string(),
            StoredBlob {
                data,
                content_type: content_type.to_string(),
            },
        );

        Ok(receipt)
    }

    async fn get(&self, id: &str) -> StorageResult<Bytes> {
        let blobs = self.blobs.read().await;
        blobs
            .get(id)
            .map(|b| b.data.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn open(&self, id: &str) -> StorageResult<BlobReader> {
        let data = self.get(id).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let mut blobs = self.blobs.write().await;
        blobs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(id))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Generate a fresh blob id
pub fn generate_blob_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Hex MD5 digest
pub fn content_hash(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn temp_store() -> LocalBlobStore {
        let dir = std::env::temp_dir().join(format!("attic-blobs-{}", generate_blob_id()));
        LocalBlobStore::new(dir)
    }

    #[tokio::test]
    async fn test_memory_storage_put_get() {
        let storage = MemoryBlobStore::new();
        let data = Bytes::from("Hello, World!");

        let receipt = storage.put("test.txt", "text/plain", data.clone()).await.unwrap();
        assert_eq!(receipt.length, 13);
        assert_eq!(receipt.hash, "65a8e27d8879283831b664bd8b7f0ad4");
        assert_eq!((receipt.width, receipt.height), (0, 0));

        let retrieved = storage.get(&receipt.id).await.unwrap();
        assert_eq!(retrieved, data);
        assert_eq!(
            storage.content_type(&receipt.id).await.as_deref(),
            Some("text/plain")
        );
    }

    #[tokio::test]
    async fn test_put_assigns_distinct_ids() {
        let storage = MemoryBlobStore::new();
        let a = storage.put("a", "text/plain", Bytes::from("x")).await.unwrap();
        let b = storage.put("a", "text/plain", Bytes::from("x")).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn test_memory_storage_delete_twice() {
        let storage = MemoryBlobStore::new();
        let receipt = storage
            .put("test.txt", "text/plain", Bytes::from("test data"))
            .await
            .unwrap();

        storage.delete(&receipt.id).await.unwrap();
        assert!(!storage.exists(&receipt.id).await.unwrap());

        let again = storage.delete(&receipt.id).await;
        assert!(matches!(again, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_copy_out_streams_bytes() {
        let storage = MemoryBlobStore::new();
        let receipt = storage
            .put("a.txt", "text/plain", Bytes::from("stream me"))
            .await
            .unwrap();

        let mut sink: Vec<u8> = Vec::new();
        let copied = storage.copy_out(&receipt.id, &mut sink).await.unwrap();
        assert_eq!(copied, 9);
        assert_eq!(sink, b"stream me");
    }

    #[tokio::test]
    async fn test_copy_out_missing_is_not_found() {
        let storage = MemoryBlobStore::new();
        let mut sink: Vec<u8> = Vec::new();
        let result = storage.copy_out("missing", &mut sink).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_storage_roundtrip() {
        let storage = temp_store();
        storage.init().await.unwrap();

        let receipt = storage
            .put("notes.txt", "text/plain", Bytes::from("on disk"))
            .await
            .unwrap();
        assert!(storage.exists(&receipt.id).await.unwrap());

        let mut reader = storage.open(&receipt.id).await.unwrap();
        let mut read_back = String::new();
        reader.read_to_string(&mut read_back).await.unwrap();
        assert_eq!(read_back, "on disk");

        storage.delete(&receipt.id).await.unwrap();
        assert!(matches!(
            storage.get(&receipt.id).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete(&receipt.id).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_storage_rejects_traversal() {
        let storage = temp_store();

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidId(_))));
    }

    #[tokio::test]
    async fn test_copy_to_store_keeps_id() {
        let source = MemoryBlobStore::new();
        let dest = MemoryBlobStore::new();
        let receipt = source
            .put("a.txt", "text/plain", Bytes::from("move me"))
            .await
            .unwrap();
        let attachment = Attachment::from_receipt(receipt.clone(), "a.txt");

        let copied = source.copy_to_store(&attachment, &dest).await.unwrap();
        assert_eq!(copied.id, receipt.id);
        assert_eq!(copied.hash, receipt.hash);
        assert_eq!(dest.get(&receipt.id).await.unwrap(), Bytes::from("move me"));
    }

    #[test]
    fn test_storage_error_kinds() {
        assert_eq!(StorageError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            StorageError::BackendError("x".into()).kind(),
            ErrorKind::Backend
        );
    }
}
