//! Response images fed to the block matcher.

use crate::params::Prefilter;
use stereo_recon_core::GrayImageView;

/// Clamped horizontal Sobel response shifted into `[0, 2 * cap]`.
/// Borders replicate the nearest pixel.
pub(crate) fn x_sobel(src: &GrayImageView<'_>, cap: u8) -> Vec<u8> {
    let (w, h) = (src.width, src.height);
    let cap = i32::from(cap);
    let mut out = vec![0u8; w * h];
    if w == 0 {
        return out;
    }
    for y in 0..h {
        let up = src.row(y.saturating_sub(1));
        let mid = src.row(y);
        let down = src.row((y + 1).min(h - 1));
        for x in 0..w {
            let l = x.saturating_sub(1);
            let r = (x + 1).min(w - 1);
            let d = |row: &[u8]| i32::from(row[r]) - i32::from(row[l]);
            let g = d(up) + 2 * d(mid) + d(down);
            out[y * w + x] = (g.clamp(-cap, cap) + cap) as u8;
        }
    }
    out
}

/// Intensity minus the mean of a `size`x`size` window, clamped and shifted
/// into `[0, 2 * cap]`.
pub(crate) fn normalized_response(src: &GrayImageView<'_>, size: usize, cap: u8) -> Vec<u8> {
    let (w, h) = (src.width, src.height);
    let cap = i32::from(cap);
    let half = size / 2;
    let integral = integral_image(w, h, |x, y| u32::from(src.get(x, y)));
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        let (y0, y1) = (y.saturating_sub(half), (y + half + 1).min(h));
        for x in 0..w {
            let (x0, x1) = (x.saturating_sub(half), (x + half + 1).min(w));
            let sum = box_sum(&integral, w, x0, y0, x1, y1);
            let n = ((x1 - x0) * (y1 - y0)) as u32;
            let mean = ((sum + n / 2) / n) as i32;
            let v = i32::from(src.get(x, y)) - mean;
            out[y * w + x] = (v.clamp(-cap, cap) + cap) as u8;
        }
    }
    out
}

pub(crate) fn apply(src: &GrayImageView<'_>, mode: Prefilter, size: usize, cap: u8) -> Vec<u8> {
    match mode {
        Prefilter::None => src.data.to_vec(),
        Prefilter::XSobel => x_sobel(src, cap),
        Prefilter::NormalizedResponse => normalized_response(src, size, cap),
    }
}

/// Summed-area table with one leading zero row and column.
pub(crate) fn integral_image(w: usize, h: usize, f: impl Fn(usize, usize) -> u32) -> Vec<u32> {
    let stride = w + 1;
    let mut table = vec![0u32; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u32;
        for x in 0..w {
            row_sum += f(x, y);
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}

/// Sum over `[x0, x1) x [y0, y1)`.
#[inline]
pub(crate) fn box_sum(table: &[u32], w: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> u32 {
    let stride = w + 1;
    table[y1 * stride + x1] + table[y0 * stride + x0]
        - table[y0 * stride + x1]
        - table[y1 * stride + x0]
}
