//! Attachment Model

use std::collections::BTreeSet;

use attic_core::AttachmentId;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::BlobReceipt;

/// Content types treated as images for probing and thumbnailing
pub const IMAGE_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/x-png",
    "image/jpeg",
    "image/jpg",
    "image/pjpeg",
    "image/gif",
    "image/bmp",
];

/// An attachment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    /// Assigned by the blob store, immutable afterwards
    pub id: AttachmentId,
    /// Owners keeping this attachment alive
    pub owner_ids: BTreeSet<String>,
    /// Groups the attachment is filed under (the empty id is a valid member)
    pub group_ids: BTreeSet<String>,
    pub category: String,
    /// Original filename
    pub filename: String,
    /// MIME content type
    pub content_type: String,
    /// Size in bytes
    pub content_length: u64,
    /// Hex MD5 digest of the bytes
    pub content_hash: String,
    pub upload_time: DateTime<Utc>,
    /// Pixel width; 0 when not probed
    pub width: u32,
    /// Pixel height; 0 when not probed
    pub height: u32,
    /// Parent of a generated thumbnail body; such records live and die with
    /// the parent and stay out of owner and group listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<AttachmentId>,
    /// Set on partial failure, never persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl Attachment {
    /// Build the record for freshly written bytes
    pub fn from_receipt(receipt: BlobReceipt, filename: impl Into<String>) -> Self {
        Self {
            id: receipt.id,
            owner_ids: BTreeSet::new(),
            group_ids: BTreeSet::new(),
            category: String::new(),
            filename: filename.into(),
            content_type: receipt.content_type,
            content_length: receipt.length,
            content_hash: receipt.hash,
            upload_time: Utc::now(),
            width: receipt.width,
            height: receipt.height,
            derived_from: None,
            last_error: None,
        }
    }

    /// Add an owner and a group reference
    pub fn owned_by(mut self, owner_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        self.owner_ids.insert(owner_id.into());
        self.group_ids.insert(group_id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Check if this is an image
    pub fn is_image(&self) -> bool {
        is_image_content_type(&self.content_type)
    }

    pub fn is_derived(&self) -> bool {
        self.derived_from.is_some()
    }

    /// More than one owner holds a reference
    pub fn is_shared(&self) -> bool {
        self.owner_ids.len() > 1
    }

    /// Probed pixel size, `None` while unprobed
    pub fn dimensions(&self) -> Option<ImageDimensions> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(ImageDimensions {
            width: self.width,
            height: self.height,
        })
    }

    /// Get file extension
    pub fn extension(&self) -> Option<&str> {
        // Only return extension if there's a dot in the filename
        if !self.filename.contains('.') {
            return None;
        }
        self.filename
            .rsplit('.')
            .next()
            .filter(|ext| ext.len() <= 10 && !ext.is_empty())
    }

    /// Human-readable file size
    pub fn human_size(&self) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

        if self.content_length == 0 {
            return "0 B".to_string();
        }

        let mut unit = 0;
        let mut scaled = self.content_length;
        while scaled >= 1024 && unit < UNITS.len() - 1 {
            scaled /= 1024;
            unit += 1;
        }

        let value = self.content_length as f64 / 1024_f64.powi(unit as i32);
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Whether a content type belongs to the recognized raster set
pub fn is_image_content_type(content_type: &str) -> bool {
    IMAGE_CONTENT_TYPES.contains(&content_type)
}

/// Parameters for creating an attachment
#[derive(Debug, Clone, Default)]
pub struct CreateAttachmentParams {
    pub filename: String,
    /// Guessed from the filename when absent
    pub content_type: Option<String>,
    pub owner_id: String,
    pub group_id: String,
    pub category: String,
}

impl CreateAttachmentParams {
    pub fn new(filename: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }

    pub fn group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Content type to store, falling back to a guess from the filename
    pub fn resolved_content_type(&self) -> String {
        match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => mime_guess::from_path(&self.filename)
                .first_or_octet_stream()
                .to_string(),
        }
    }
}

/// One file of a batch upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn content_type(mut self, ct: impl Into<String>) -> Self {
        self.content_type = Some(ct.into());
        self
    }
}

/// Result of a reference-counted delete
#[derive(Debug, Clone)]
pub struct DeleteOutcome {
    /// The record after the operation (as it was, when fully deleted)
    pub attachment: Attachment,
    /// Blob and metadata are gone
    pub fully_deleted: bool,
}

/// Attachment with embedded download URL
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentWithUrl {
    #[serde(flatten)]
    pub attachment: Attachment,
    pub download_url: String,
}

impl AttachmentWithUrl {
    pub fn new(attachment: Attachment, download_url: String) -> Self {
        Self {
            attachment,
            download_url,
        }
    }
}

/// Image dimensions (for image attachments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(content_type: &str, length: u64) -> BlobReceipt {
        BlobReceipt {
            id: "abc123".to_string(),
            length,
            hash: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
            content_type: content_type.to_string(),
            width: 0,
            height: 0,
        }
    }

    #[test]
    fn test_attachment_creation() {
        let attachment = Attachment::from_receipt(receipt("application/pdf", 1024), "doc.pdf")
            .owned_by("owner-1", "")
            .with_category("posts");

        assert_eq!(attachment.id, "abc123");
        assert_eq!(attachment.filename, "doc.pdf");
        assert_eq!(attachment.category, "posts");
        assert!(attachment.owner_ids.contains("owner-1"));
        assert!(attachment.group_ids.contains(""));
        assert!(!attachment.is_image());
        assert!(!attachment.is_shared());
    }

    #[test]
    fn test_shared_and_image() {
        let attachment = Attachment::from_receipt(receipt("image/bmp", 10), "a.bmp")
            .owned_by("a", "g")
            .owned_by("b", "g");

        assert!(attachment.is_shared());
        assert!(attachment.is_image());
        assert_eq!(attachment.group_ids.len(), 1);
    }

    #[test]
    fn test_unprobed_dimensions() {
        let mut attachment = Attachment::from_receipt(receipt("image/bmp", 10), "a.bmp");
        assert_eq!(attachment.dimensions(), None);

        attachment.width = 20;
        attachment.height = 10;
        assert_eq!(
            attachment.dimensions(),
            Some(ImageDimensions {
                width: 20,
                height: 10
            })
        );
    }

    #[test]
    fn test_human_size() {
        let cases = [
            (0, "0 B"),
            (512, "512.0 B"),
            (1024, "1.0 KB"),
            (1536, "1.5 KB"),
            (1024 * 1024, "1.0 MB"),
            (1024 * 1024 * 1024, "1.0 GB"),
        ];

        for (size, expected) in cases {
            let attachment = Attachment::from_receipt(receipt("text/plain", size), "t");
            assert_eq!(attachment.human_size(), expected, "Size: {}", size);
        }
    }

    #[test]
    fn test_extension() {
        let pdf = Attachment::from_receipt(receipt("application/pdf", 1), "report.pdf");
        assert_eq!(pdf.extension(), Some("pdf"));

        let no_ext = Attachment::from_receipt(receipt("text/plain", 1), "noextension");
        assert_eq!(no_ext.extension(), None);

        let double = Attachment::from_receipt(receipt("application/gzip", 1), "a.tar.gz");
        assert_eq!(double.extension(), Some("gz"));
    }

    #[test]
    fn test_resolved_content_type() {
        let guessed = CreateAttachmentParams::new("notes.txt", "o");
        assert_eq!(guessed.resolved_content_type(), "text/plain");

        let explicit = CreateAttachmentParams::new("notes.txt", "o").content_type("text/markdown");
        assert_eq!(explicit.resolved_content_type(), "text/markdown");

        let unknown = CreateAttachmentParams::new("blob", "o");
        assert_eq!(unknown.resolved_content_type(), "application/octet-stream");
    }

    #[test]
    fn test_last_error_is_not_serialized_when_absent() {
        let attachment = Attachment::from_receipt(receipt("text/plain", 1), "t.txt");
        let json = serde_json::to_value(&attachment).unwrap();
        assert!(json.get("last_error").is_none());
    }
}
