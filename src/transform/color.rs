//! NV21 colour conversion (BT.601, limited range, fixed point)

use crate::capture::RawFrame;

#[inline]
fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (i32::from(y) - 16).max(0) * 298;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    [
        clamp((c + 409 * e + 128) >> 8),
        clamp((c - 100 * d - 208 * e + 128) >> 8),
        clamp((c + 516 * d + 128) >> 8),
    ]
}

/// Convert an NV21 frame into a tightly packed RGBA buffer
pub fn nv21_to_rgba(raw: &RawFrame<'_>) -> Vec<u8> {
    let width = raw.width() as usize;
    let luma = raw.luma();
    let chroma = raw.chroma();

    let mut rgba = Vec::with_capacity(luma.len() * 4);
    for (y, row) in luma.chunks_exact(width).enumerate() {
        let chroma_row = &chroma[(y / 2) * width..(y / 2 + 1) * width];
        for (x, &luma) in row.iter().enumerate() {
            let pair = (x / 2) * 2;
            let [r, g, b] = yuv_to_rgb(luma, chroma_row[pair + 1], chroma_row[pair]);
            rgba.extend_from_slice(&[r, g, b, 255]);
        }
    }
    rgba
}

/// Luma of an RGBA buffer, one byte per pixel
pub fn rgba_to_gray(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .map(|px| {
            let weighted = 77 * u32::from(px[0]) + 150 * u32::from(px[1]) + 29 * u32::from(px[2]);
            ((weighted + 128) >> 8) as u8
        })
        .collect()
}
