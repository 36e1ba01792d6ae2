// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion to packed RGB
//!
//! Every backend hands out RGB frames, whatever the sensor streams natively.

/// Convert one BT.601 YUV sample to RGB
#[inline]
fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
    [r, g, b]
}

/// Convert packed 4:2:2 data to RGB
///
/// `order` gives the byte offsets of (Y0, U, Y1, V) within each 4-byte group.
fn packed_422_to_rgb(data: &[u8], width: u32, height: u32, order: [usize; 4]) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[order[0]] as f32;
        let u = chunk[order[1]] as f32 - 128.0;
        let y1 = chunk[order[2]] as f32;
        let v = chunk[order[3]] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break;
            }
            rgb.extend_from_slice(&yuv_to_rgb(y, u, v));
        }
    }

    rgb
}

/// Convert YUYV (Y0 U Y1 V) to RGB
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    packed_422_to_rgb(data, width, height, [0, 1, 2, 3])
}

/// Convert UYVY (U Y0 V Y1) to RGB
pub fn uyvy_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    packed_422_to_rgb(data, width, height, [1, 0, 3, 2])
}

/// Decode an MJPEG frame to RGB, returning (rgb, width, height)
pub fn mjpeg_to_rgb(data: &[u8]) -> Result<(Vec<u8>, u32, u32), String> {
    let img = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| format!("MJPEG decode failed: {}", e))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok((rgb.into_raw(), width, height))
}

/// Bytes a raw frame must contain for the given FourCC
pub fn expected_frame_size(fourcc: &[u8; 4], width: u32, height: u32) -> Option<usize> {
    let pixels = width as usize * height as usize;
    match fourcc {
        b"YUYV" | b"UYVY" => Some(pixels * 2),
        b"RGB3" => Some(pixels * 3),
        // Compressed; size varies per frame
        b"MJPG" => None,
        _ => None,
    }
}
