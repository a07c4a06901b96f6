//! Edge feathering via a separable box blur

use crate::{
    error::{CutoutError, Result},
    types::AlphaBuffer,
};

/// Smooth an alpha buffer with a separable box blur of radius `floor(radius)`
///
/// The averaging window shrinks at the borders instead of wrapping or
/// zero-padding. A radius below 1 returns an exact copy.
///
/// # Errors
/// `DimensionMismatch` if `alpha.len() != width * height`
pub fn feather(alpha: &[f32], width: u32, height: u32, radius: f32) -> Result<AlphaBuffer> {
    let expected = width as usize * height as usize;
    if alpha.len() != expected {
        return Err(CutoutError::dimension_mismatch(
            "feather",
            expected,
            alpha.len(),
        ));
    }

    let r = if radius.is_finite() && radius > 0.0 {
        radius.floor() as usize
    } else {
        0
    };

    if r == 0 || expected == 0 {
        return Ok(AlphaBuffer::from_clamped(alpha.to_vec(), width, height));
    }

    let (w, h) = (width as usize, height as usize);

    let mut horizontal = Vec::with_capacity(expected);
    for row in alpha.chunks_exact(w) {
        box_pass(row, r, &mut horizontal);
    }

    let vertical = blur_columns(&horizontal, w, h, r);

    let data = vertical.into_iter().map(|v| v.clamp(0.0, 1.0)).collect();
    Ok(AlphaBuffer::from_clamped(data, width, height))
}

/// Feather an existing buffer in place of its own dimensions
pub fn feather_buffer(alpha: &AlphaBuffer, radius: f32) -> Result<AlphaBuffer> {
    feather(alpha.as_slice(), alpha.width(), alpha.height(), radius)
}

/// Append the windowed mean of every sample in `line` to `out`
///
/// A running sum over `f64` keeps the pass linear in the line length.
fn box_pass(line: &[f32], r: usize, out: &mut Vec<f32>) {
    let n = line.len();
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0_f64);
    let mut acc = 0.0_f64;
    for v in line {
        acc += f64::from(*v);
        prefix.push(acc);
    }

    // `prefix` has n + 1 entries and both bounds are at most n
    #[allow(clippy::indexing_slicing)]
    for i in 0..n {
        let start = i.saturating_sub(r);
        let end = (i + r + 1).min(n);
        let mean = (prefix[end] - prefix[start]) / (end - start) as f64;
        out.push(mean as f32);
    }
}

/// Vertical pass: the same window mean applied column-wise
fn blur_columns(src: &[f32], w: usize, h: usize, r: usize) -> Vec<f32> {
    let mut column = Vec::with_capacity(h);
    let mut blurred = Vec::with_capacity(h);
    let mut out = vec![0.0_f32; src.len()];

    for x in 0..w {
        column.clear();
        column.extend(src.iter().skip(x).step_by(w).copied());

        blurred.clear();
        box_pass(&column, r, &mut blurred);

        for (dst, value) in out.iter_mut().skip(x).step_by(w).zip(&blurred) {
            *dst = *value;
        }
    }

    out
}
