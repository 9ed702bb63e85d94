//! Pixel conversion and JPEG encoding helpers.

use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

/// Convert a packed YUYV (4:2:2) buffer to RGB24.
///
/// Returns `None` when the buffer is too short for the given dimensions.
/// Uses the ITU-R BT.601 conversion.
pub(crate) fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let pixels = (width as usize) * (height as usize);
    if pixels % 2 != 0 || data.len() < pixels * 2 {
        return None;
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for quad in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        push_rgb(&mut rgb, y0, u, v);
        push_rgb(&mut rgb, y1, u, v);
    }
    Some(rgb)
}

fn push_rgb(out: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;

    let r = y + 1.402 * v;
    let g = y - 0.344_14 * u - 0.714_14 * v;
    let b = y + 1.772 * u;

    out.push(clamp_u8(r));
    out.push(clamp_u8(g));
    out.push(clamp_u8(b));
}

fn clamp_u8(value: f32) -> u8 {
    value.clamp(0.0, 255.0) as u8
}

/// Encode an RGB24 buffer as JPEG at the given quality.
///
/// Returns `None` when the buffer does not match the dimensions or the
/// encoder fails.
pub(crate) fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Option<Vec<u8>> {
    let expected = (width as usize) * (height as usize) * 3;
    if rgb.len() < expected {
        return None;
    }

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
    match encoder.encode(&rgb[..expected], width, height, ExtendedColorType::Rgb8) {
        Ok(()) => Some(jpeg),
        Err(err) => {
            log::warn!("jpeg encode failed: {err}");
            None
        }
    }
}
