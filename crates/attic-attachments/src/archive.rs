//! Zip archive bundling
//!
//! Entry names follow the attachment filename. A second file with the same
//! name but different content is stored as `<hash>_<filename>`; a file with
//! the same name and hash as one already written is skipped.
//!
//! The zip is written on the blocking pool. Each entry is streamed from its
//! blob reader into the compressor, so no attachment is held in memory whole.

use std::collections::HashSet;
use std::io::{Seek, Write};
use std::sync::Arc;

use attic_core::{AttachmentId, Classify, ErrorKind};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::model::Attachment;
use crate::storage::{BlobStore, StorageError};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to read {id} into archive: {source}")]
    Storage {
        id: AttachmentId,
        #[source]
        source: StorageError,
    },
    #[error("Failed to copy {id} into archive: {source}")]
    Copy {
        id: AttachmentId,
        #[source]
        source: std::io::Error,
    },
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Archive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Classify for ArchiveError {
    fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Storage { source, .. } => source.kind(),
            ArchiveError::Copy { .. } | ArchiveError::Zip(_) | ArchiveError::Io(_) => {
                ErrorKind::Backend
            }
            ArchiveError::Join(_) => ErrorKind::Internal,
        }
    }
}

/// One file to write into the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub attachment_id: AttachmentId,
    pub name: String,
}

/// What a finished build wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub names: Vec<String>,
    pub skipped: usize,
}

/// Apply the naming policy to attachments, in order
pub fn plan_entries(attachments: &[Attachment]) -> Vec<ArchiveEntry> {
    let mut names: HashSet<String> = HashSet::new();
    let mut pairs: HashSet<(String, String)> = HashSet::new();
    let mut entries = Vec::with_capacity(attachments.len());

    for attachment in attachments {
        let pair = (attachment.content_hash.clone(), attachment.filename.clone());

        let name = if !names.contains(&attachment.filename) {
            attachment.filename.clone()
        } else if pairs.contains(&pair) {
            continue;
        } else {
            format!("{}_{}", attachment.content_hash, attachment.filename)
        };

        names.insert(attachment.filename.clone());
        names.insert(name.clone());
        pairs.insert(pair);
        entries.push(ArchiveEntry {
            attachment_id: attachment.id.clone(),
            name,
        });
    }

    entries
}

/// Writes attachments into a zip archive
#[derive(Clone)]
pub struct ArchiveBundler {
    blobs: Arc<dyn BlobStore>,
}

impl ArchiveBundler {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Write the archive into `sink` and hand the sink back once the
    /// central directory is written.
    ///
    /// The first failed read aborts the build; whatever already reached
    /// the sink stays there.
    #[instrument(skip_all, fields(count = attachments.len()))]
    pub async fn build_archive<W>(
        &self,
        attachments: &[Attachment],
        sink: W,
    ) -> Result<(ArchiveSummary, W), ArchiveError>
    where
        W: Write + Seek + Send + 'static,
    {
        let entries = plan_entries(attachments);
        let skipped = attachments.len() - entries.len();
        let blobs = self.blobs.clone();
        let handle = Handle::current();

        let (names, sink) = tokio::task::spawn_blocking(move || {
            write_entries(&handle, blobs.as_ref(), entries, sink)
        })
        .await??;

        Ok((ArchiveSummary { names, skipped }, sink))
    }
}

fn write_entries<W: Write + Seek>(
    handle: &Handle,
    blobs: &dyn BlobStore,
    entries: Vec<ArchiveEntry>,
    sink: W,
) -> Result<(Vec<String>, W), ArchiveError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(sink);
    let mut names = Vec::with_capacity(entries.len());

    for entry in entries {
        let reader = handle
            .block_on(blobs.open(&entry.attachment_id))
            .map_err(|source| ArchiveError::Storage {
                id: entry.attachment_id.clone(),
                source,
            })?;

        zip.start_file(entry.name.as_str(), options)?;
        let mut reader = SyncIoBridge::new_with_handle(reader, handle.clone());
        let size = match std::io::copy(&mut reader, &mut zip) {
            Ok(size) => size,
            Err(source) => {
                if let Err(e) = zip.abort_file() {
                    warn!(name = %entry.name, error = %e, "Failed to drop partial archive entry");
                }
                return Err(ArchiveError::Copy {
                    id: entry.attachment_id,
                    source,
                });
            }
        };

        debug!(name = %entry.name, size, "Archive entry written");
        names.push(entry.name);
    }

    let sink = zip.finish()?;
    Ok((names, sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BlobReceipt, MemoryBlobStore};
    use bytes::Bytes;
    use std::io::{Cursor, Read, SeekFrom};
    use std::sync::Mutex;

    /// Sink whose bytes stay readable after the bundler consumed it
    #[derive(Clone, Debug, Default)]
    struct SharedSink(Arc<Mutex<Cursor<Vec<u8>>>>);

    impl SharedSink {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().get_ref().clone()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for SharedSink {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.lock().unwrap().seek(pos)
        }
    }

    async fn stored(blobs: &MemoryBlobStore, filename: &str, body: &'static str) -> Attachment {
        let receipt: BlobReceipt = blobs
            .put(filename, "text/plain", Bytes::from(body))
            .await
            .unwrap();
        Attachment::from_receipt(receipt, filename)
    }

    fn attachment(id: &str, filename: &str, hash: &str) -> Attachment {
        let receipt = BlobReceipt {
            id: id.to_string(),
            length: 1,
            hash: hash.to_string(),
            content_type: "text/plain".to_string(),
            width: 0,
            height: 0,
        };
        Attachment::from_receipt(receipt, filename)
    }

    #[test]
    fn test_plan_renames_name_collisions() {
        let plan = plan_entries(&[
            attachment("1", "a.txt", "h1"),
            attachment("2", "a.txt", "h2"),
            attachment("3", "b.txt", "h1"),
        ]);

        let names: Vec<_> = plan.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "h2_a.txt", "b.txt"]);
    }

    #[test]
    fn test_plan_skips_true_duplicates() {
        let plan = plan_entries(&[
            attachment("1", "a.txt", "h1"),
            attachment("2", "a.txt", "h1"),
            attachment("3", "a.txt", "h2"),
            attachment("4", "a.txt", "h2"),
        ]);

        let ids: Vec<_> = plan.iter().map(|e| e.attachment_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn test_build_archive_with_collisions() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let first = stored(&blobs, "a.txt", "first").await;
        let second = stored(&blobs, "a.txt", "second").await;
        let copy = stored(&blobs, "a.txt", "first").await;

        let bundler = ArchiveBundler::new(blobs.clone());
        let (summary, sink) = bundler
            .build_archive(&[first, second.clone(), copy], Cursor::new(Vec::new()))
            .await
            .unwrap();

        let renamed = format!("{}_a.txt", second.content_hash);
        assert_eq!(summary.names, vec!["a.txt".to_string(), renamed.clone()]);
        assert_eq!(summary.skipped, 1);

        let mut archive = zip::ZipArchive::new(Cursor::new(sink.into_inner())).unwrap();
        assert_eq!(archive.len(), 2);

        let mut body = String::new();
        archive
            .by_name(&renamed)
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "second");
    }

    #[tokio::test]
    async fn test_build_archive_aborts_on_missing_blob() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let present = stored(&blobs, "a.txt", "here").await;
        let missing = attachment("missing", "b.txt", "h");
        let after = stored(&blobs, "c.txt", "never").await;

        let bundler = ArchiveBundler::new(blobs);
        let sink = SharedSink::default();
        let err = bundler
            .build_archive(&[present, missing, after], sink.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // The entry written before the failure is still in the sink
        let written = sink.bytes();
        assert!(written.starts_with(b"PK\x03\x04"));
        assert!(written.windows(5).any(|w| w == b"a.txt"));
        assert!(!written.windows(5).any(|w| w == b"c.txt"));
    }

    #[tokio::test]
    async fn test_build_archive_streams_into_file() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let big = Bytes::from(vec![b'x'; 256 * 1024]);
        let receipt = blobs.put("big.bin", "application/octet-stream", big).await.unwrap();
        let attachment = Attachment::from_receipt(receipt, "big.bin");

        let bundler = ArchiveBundler::new(blobs);
        let (summary, mut file) = bundler
            .build_archive(&[attachment], tempfile::tempfile().unwrap())
            .await
            .unwrap();
        assert_eq!(summary.names, vec!["big.bin".to_string()]);

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let entry = archive.by_name("big.bin").unwrap();
        assert_eq!(entry.size(), 256 * 1024);
    }
}
