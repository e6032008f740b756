//! Image header probing
//!
//! Reads pixel dimensions from the image header only; the pixel data is
//! never decoded. Content types outside [`PROBED_CONTENT_TYPES`] stay
//! unprobed (`0x0`), including `image/bmp`, which is treated as an image
//! elsewhere but has no decoder compiled in.

use std::io::Cursor;

use image::ImageReader;
use tracing::debug;

/// Content types whose headers are read at write time
pub const PROBED_CONTENT_TYPES: &[&str] = &[
    "image/png",
    "image/x-png",
    "image/jpeg",
    "image/jpg",
    "image/pjpeg",
    "image/gif",
];

/// Probe `(width, height)`; `None` for unprobed types and unreadable headers
pub fn probe_dimensions(content_type: &str, data: &[u8]) -> Option<(u32, u32)> {
    if !PROBED_CONTENT_TYPES.contains(&content_type) {
        return None;
    }

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?;

    match reader.into_dimensions() {
        Ok(dimensions) => Some(dimensions),
        Err(e) => {
            debug!(content_type, error = %e, "Image header could not be probed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_probe_png() {
        assert_eq!(probe_dimensions("image/png", &png(40, 30)), Some((40, 30)));
    }

    #[test]
    fn test_unrecognized_type_is_unprobed() {
        assert_eq!(probe_dimensions("image/bmp", &png(40, 30)), None);
        assert_eq!(probe_dimensions("text/plain", b"hello"), None);
    }

    #[test]
    fn test_garbage_bytes_are_unprobed() {
        assert_eq!(probe_dimensions("image/jpeg", b"not an image"), None);
    }
}
