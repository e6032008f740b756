//! Default thumbnail image
//!
//! Served whenever a thumbnail can't be produced. Loaded once at startup.

use std::io::Cursor;

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use tracing::info;

use crate::error::{ThumbnailError, ThumbnailResult};

/// Side of the generated placeholder, in pixels
pub const PLACEHOLDER_SIZE: u32 = 64;

#[derive(Debug, Clone)]
pub struct Placeholder {
    bytes: Bytes,
    content_type: String,
}

impl Placeholder {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    /// Read the placeholder from `path`, or generate one when unset
    pub async fn load(path: Option<&str>) -> ThumbnailResult<Self> {
        let Some(path) = path else {
            return Self::generated();
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ThumbnailError::Placeholder {
                path: path.to_string(),
                source,
            })?;
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();

        info!(path, size = bytes.len(), "Placeholder loaded");
        Ok(Self::new(bytes, content_type))
    }

    /// A flat light grey PNG square
    pub fn generated() -> ThumbnailResult<Self> {
        let img = RgbaImage::from_pixel(
            PLACEHOLDER_SIZE,
            PLACEHOLDER_SIZE,
            Rgba([224, 224, 224, 255]),
        );
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| ThumbnailError::Encode(format!("failed to encode placeholder: {e}")))?;
        Ok(Self::new(buf.into_inner(), "image/png"))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }
}
