//! Image resizing
//!
//! [`calculate_dimensions`] is pure arithmetic; [`resize`] decodes, crops,
//! scales and re-encodes. Both are synchronous and CPU bound, so callers on
//! the async runtime should go through `spawn_blocking`.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};

use crate::error::{ThumbnailError, ThumbnailResult};
use crate::spec::ThumbnailSpec;

/// JPEG output quality
pub const JPEG_QUALITY: u8 = 95;

/// Output of a resize
#[derive(Debug, Clone)]
pub struct Resized {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl Resized {
    pub fn content_type(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => "image/png",
            _ => "image/jpeg",
        }
    }
}

/// Target size for a `src_w` x `src_h` source. Never upscales.
pub fn calculate_dimensions(
    src_w: u32,
    src_h: u32,
    spec: &ThumbnailSpec,
) -> ThumbnailResult<(u32, u32)> {
    if spec.width == 0 && spec.height == 0 {
        return Err(ThumbnailError::InvalidSpec(format!(
            "{}: width and height are both 0",
            spec.name
        )));
    }
    if src_w == 0 || src_h == 0 {
        return Err(ThumbnailError::Decode(format!(
            "source has no pixels ({src_w}x{src_h})"
        )));
    }

    if spec.crop_to_square && spec.width == spec.height {
        let side = src_w.min(src_h);
        if spec.width >= side {
            return Ok((side, side));
        }
        return Ok((spec.width, spec.width));
    }

    let (w, h) = if spec.height == 0 {
        (spec.width, scale(spec.width, src_h, src_w))
    } else if spec.width == 0 {
        (scale(spec.height, src_w, src_h), spec.height)
    } else {
        let h = scale(spec.width, src_h, src_w);
        if h > spec.height {
            (scale(spec.height, src_w, src_h), spec.height)
        } else {
            (spec.width, h)
        }
    };

    if w >= src_w || h >= src_h {
        return Ok((src_w, src_h));
    }
    Ok((w, h))
}

// bound * num / den, rounded, at least 1
fn scale(bound: u32, num: u32, den: u32) -> u32 {
    let scaled = (f64::from(bound) * f64::from(num) / f64::from(den)).round();
    (scaled as u32).max(1)
}

/// Resize encoded image bytes to `spec`.
///
/// PNG stays PNG. JPEG and GIF come out as JPEG.
pub fn resize(data: &[u8], spec: &ThumbnailSpec) -> ThumbnailResult<Resized> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ThumbnailError::Decode(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| ThumbnailError::Decode("unrecognized image data".into()))?;
    let output = match format {
        ImageFormat::Png => ImageFormat::Png,
        ImageFormat::Jpeg | ImageFormat::Gif => ImageFormat::Jpeg,
        other => return Err(ThumbnailError::UnsupportedFormat(format!("{other:?}"))),
    };

    let image = reader
        .decode()
        .map_err(|e| ThumbnailError::Decode(e.to_string()))?;
    let (width, height) = calculate_dimensions(image.width(), image.height(), spec)?;

    let source = if spec.crop_to_square && image.width() != image.height() {
        let side = image.width().min(image.height());
        let x = (image.width() - side) / 2;
        let y = (image.height() - side) / 2;
        image.crop_imm(x, y, side, side)
    } else {
        image
    };

    let scaled = if (source.width(), source.height()) == (width, height) {
        source
    } else {
        source.resize_exact(width, height, FilterType::Lanczos3)
    };

    let bytes = encode(&scaled, output)?;
    Ok(Resized {
        bytes: Bytes::from(bytes),
        width,
        height,
        format: output,
    })
}

fn encode(image: &DynamicImage, format: ImageFormat) -> ThumbnailResult<Vec<u8>> {
    let mut buf = Vec::new();
    let (w, h) = (image.width(), image.height());

    let result = if format == ImageFormat::Png {
        let rgba = image.to_rgba8();
        PngEncoder::new(&mut buf).write_image(&rgba, w, h, ExtendedColorType::Rgba8)
    } else {
        let rgb = image.to_rgb8();
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).write_image(
            &rgb,
            w,
            h,
            ExtendedColorType::Rgb8,
        )
    };

    result.map_err(|e| ThumbnailError::Encode(e.to_string()))?;
    Ok(buf)
}
