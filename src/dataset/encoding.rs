// SPDX-License-Identifier: GPL-3.0-only

//! JPEG encoding and thumbnail decoding for samples

use crate::backends::camera::Frame;
use crate::errors::StorageError;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;
use std::path::Path;
use tracing::debug;

/// Encode a frame as JPEG at the given quality (1-100)
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, StorageError> {
    let color = match frame.channels {
        1 => ExtendedColorType::L8,
        3 => ExtendedColorType::Rgb8,
        other => {
            return Err(StorageError::Encode(format!(
                "unsupported channel count {}",
                other
            )));
        }
    };

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder
        .encode(&frame.data, frame.width, frame.height, color)
        .map_err(|e| StorageError::Encode(e.to_string()))?;

    debug!(
        width = frame.width,
        height = frame.height,
        size = buffer.len(),
        "JPEG encoding complete"
    );
    Ok(buffer)
}

/// Decode a stored sample once and scale it to a thumbnail
///
/// `None` when the file cannot be read or decoded.
pub fn decode_thumbnail(path: &Path, max_edge: u32) -> Option<Frame> {
    let image = match image::open(path) {
        Ok(image) => image,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Unreadable sample, no thumbnail");
            return None;
        }
    };
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    Some(Frame::new(width, height, 3, rgb.into_raw()).downscaled(max_edge))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rgb_and_gray() {
        let rgb = Frame::new(16, 8, 3, vec![120; 16 * 8 * 3]);
        let gray = Frame::new(16, 8, 1, vec![60; 16 * 8]);
        let jpeg = encode_jpeg(&rgb, 92).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert!(encode_jpeg(&gray, 92).is_ok());
    }

    #[test]
    fn test_thumbnail_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.jpg");
        let frame = Frame::new(200, 100, 3, vec![200; 200 * 100 * 3]);
        std::fs::write(&path, encode_jpeg(&frame, 90).unwrap()).unwrap();

        let thumb = decode_thumbnail(&path, 58).unwrap();
        assert_eq!((thumb.width, thumb.height), (58, 29));

        std::fs::write(&path, b"not a jpeg").unwrap();
        assert!(decode_thumbnail(&path, 58).is_none());
    }
}
