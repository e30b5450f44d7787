//! Frame to JPEG/base64 encoding for vision queries

use crate::provider::{QueryError, QueryResult};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use scopebus_core::FrameBatch;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Encode frame `index` of `batch` as a base64 JPEG.
///
/// RGB and grayscale frames are encoded as-is; an alpha channel is dropped.
pub fn frame_to_jpeg_base64(batch: &FrameBatch, index: usize, quality: u8) -> QueryResult<String> {
    let [_, height, width, channels] = batch.shape();
    let bytes = batch
        .frame_bytes(index)
        .ok_or_else(|| QueryError::Encode(format!("no frame at index {index}")))?;

    let (pixels, color) = match channels {
        1 => (bytes, ExtendedColorType::L8),
        3 => (bytes, ExtendedColorType::Rgb8),
        4 => (
            bytes
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            ExtendedColorType::Rgb8,
        ),
        n => return Err(QueryError::Encode(format!("unsupported channel count {n}"))),
    };

    let width = u32::try_from(width).map_err(|e| QueryError::Encode(e.to_string()))?;
    let height = u32::try_from(height).map_err(|e| QueryError::Encode(e.to_string()))?;

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality)
        .write_image(&pixels, width, height, color)
        .map_err(|e| QueryError::Encode(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
}
