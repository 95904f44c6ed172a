//! Per-pixel image operations.

// BT.601 luma in 14-bit fixed point.
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let v = (r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT + (1 << (SHIFT - 1)))
        >> SHIFT;
    v.min(255) as u8
}

/// Collapse interleaved pixels of `channels` channels (RGB first) to gray.
pub(crate) fn to_gray(src: &[u8], channels: usize) -> Vec<u8> {
    src.chunks_exact(channels)
        .map(|px| luma(px[0], px[1], px[2]))
        .collect()
}

/// Expand gray to RGBA with opaque alpha.
pub(crate) fn gray_to_rgba(src: &[u8]) -> Vec<u8> {
    src.iter().flat_map(|&v| [v, v, v, 255]).collect()
}

/// Append an opaque alpha channel to RGB.
pub(crate) fn rgb_to_rgba(src: &[u8]) -> Vec<u8> {
    src.chunks_exact(3)
        .flat_map(|px| [px[0], px[1], px[2], 255])
        .collect()
}

/// Binary threshold on 8-bit data.
///
/// The threshold is floored and the max value rounded, as 8-bit thresholds
/// compare against integers.
pub(crate) fn threshold(src: &[u8], thresh: f64, max_value: f64) -> Vec<u8> {
    let t = thresh.floor();
    let max = max_value.round().clamp(0.0, 255.0) as u8;
    src.iter()
        .map(|&v| if f64::from(v) > t { max } else { 0 })
        .collect()
}
