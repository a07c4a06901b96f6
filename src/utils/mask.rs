//! Mask geometry resolution and bilinear resampling
//!
//! The model emits its mask at its own working resolution. These helpers read
//! the mask grid size off the shape descriptor and stretch the grid back to
//! the source image's resolution.

use crate::{
    error::{CutoutError, Result},
    types::{AlphaBuffer, MaskTensor},
};

/// Width and height of a mask grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskSize {
    pub width: usize,
    pub height: usize,
}

impl MaskSize {
    /// Number of cells in the grid
    #[must_use]
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// Resolve the mask grid size from the shape descriptor
///
/// Accepts `[1, 1, H, W]` and `[1, H, W]`. Only the dims are inspected; the
/// data buffer is never read.
///
/// # Errors
/// `UnsupportedMaskRank` for any rank other than 3 or 4
pub fn mask_size(mask: &MaskTensor) -> Result<MaskSize> {
    match mask.dims.as_slice() {
        [_, _, height, width] | [_, height, width] => Ok(MaskSize {
            width: *width,
            height: *height,
        }),
        dims => Err(CutoutError::UnsupportedMaskRank {
            rank: dims.len(),
            dims: dims.to_vec(),
        }),
    }
}

/// Bilinearly resample a mask grid to `target_width x target_height`
///
/// Uses the half-pixel center convention. Neighbor indices are clamped to the
/// grid while the fractional weights are not, so boundary pixels extrapolate
/// slightly; the final value is clamped to `[0, 1]`.
///
/// # Errors
/// `DimensionMismatch` if the mask data does not hold exactly
/// `mask_width * mask_height` values, or the grid is empty
pub fn resample(
    mask: &MaskTensor,
    mask_width: usize,
    mask_height: usize,
    target_width: u32,
    target_height: u32,
) -> Result<AlphaBuffer> {
    let grid_len = mask_width
        .checked_mul(mask_height)
        .ok_or_else(|| CutoutError::dimension_mismatch("resample", usize::MAX, mask.data.len()))?;
    if grid_len == 0 {
        return Err(CutoutError::dimension_mismatch("resample", 1, 0));
    }
    if mask.data.len() != grid_len {
        return Err(CutoutError::dimension_mismatch(
            "resample",
            grid_len,
            mask.data.len(),
        ));
    }

    let data = &mask.data;
    // Indices are clamped to the grid and the length was checked above
    #[allow(clippy::indexing_slicing)]
    let sample = |x: usize, y: usize| -> f64 { f64::from(data[y * mask_width + x]) };

    let scale_x = mask_width as f64 / f64::from(target_width);
    let scale_y = mask_height as f64 / f64::from(target_height);
    let max_x = mask_width - 1;
    let max_y = mask_height - 1;

    let mut output = Vec::with_capacity(target_width as usize * target_height as usize);

    for y in 0..target_height {
        let sy = (f64::from(y) + 0.5) * scale_y - 0.5;
        let y0 = clamp_index(sy.floor(), max_y);
        let y1 = (y0 + 1).min(max_y);
        let fy = sy - y0 as f64;

        for x in 0..target_width {
            let sx = (f64::from(x) + 0.5) * scale_x - 0.5;
            let x0 = clamp_index(sx.floor(), max_x);
            let x1 = (x0 + 1).min(max_x);
            let fx = sx - x0 as f64;

            let value = (1.0 - fx) * (1.0 - fy) * sample(x0, y0)
                + fx * (1.0 - fy) * sample(x1, y0)
                + (1.0 - fx) * fy * sample(x0, y1)
                + fx * fy * sample(x1, y1);

            output.push(value.clamp(0.0, 1.0) as f32);
        }
    }

    Ok(AlphaBuffer::from_clamped(output, target_width, target_height))
}

/// Resolve the grid size and resample in one step
pub fn mask_to_alpha(mask: &MaskTensor, target_width: u32, target_height: u32) -> Result<AlphaBuffer> {
    let size = mask_size(mask)?;
    resample(mask, size.width, size.height, target_width, target_height)
}

fn clamp_index(value: f64, max: usize) -> usize {
    if value <= 0.0 {
        0
    } else {
        (value as usize).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform_mask(dims: Vec<usize>, value: f32) -> MaskTensor {
        let len = dims.iter().product();
        MaskTensor::new(vec![value; len], dims)
    }

    #[test]
    fn test_mask_size_rank_four() {
        let mask = MaskTensor::new(Vec::new(), vec![1, 1, 320, 320]);
        assert_eq!(
            mask_size(&mask).unwrap(),
            MaskSize {
                width: 320,
                height: 320
            }
        );
    }

    #[test]
    fn test_mask_size_rank_three() {
        let mask = MaskTensor::new(Vec::new(), vec![1, 100, 200]);
        let size = mask_size(&mask).unwrap();
        assert_eq!(size.width, 200);
        assert_eq!(size.height, 100);
    }

    #[test]
    fn test_mask_size_rejects_other_ranks() {
        for dims in [vec![], vec![320], vec![320, 320], vec![1, 1, 1, 320, 320]] {
            let err = mask_size(&MaskTensor::new(Vec::new(), dims.clone())).unwrap_err();
            match err {
                CutoutError::UnsupportedMaskRank { rank, dims: got } => {
                    assert_eq!(rank, dims.len());
                    assert_eq!(got, dims);
                },
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_resample_length_and_range() {
        let values: Vec<f32> = (0..16).map(|i| i as f32 / 5.0 - 1.0).collect();
        let mask = MaskTensor::new(values, vec![1, 4, 4]);

        for (tw, th) in [(1, 1), (3, 7), (4, 4), (13, 2), (100, 60)] {
            let alpha = resample(&mask, 4, 4, tw, th).unwrap();
            assert_eq!(alpha.len(), (tw * th) as usize);
            assert_eq!((alpha.width(), alpha.height()), (tw, th));
            assert!(alpha.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_resample_uniform_half_mask() {
        let mask = uniform_mask(vec![1, 1, 320, 320], 0.5);
        let alpha = resample(&mask, 320, 320, 640, 480).unwrap();
        assert_eq!(alpha.len(), 307_200);
        assert!(alpha.as_slice().iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_resample_same_size_is_exact() {
        let values = vec![0.0, 0.25, 0.5, 0.75, 1.0, 0.1];
        let mask = MaskTensor::new(values.clone(), vec![1, 2, 3]);
        let alpha = resample(&mask, 3, 2, 3, 2).unwrap();
        for (got, want) in alpha.as_slice().iter().zip(&values) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn test_resample_interpolates_between_cells() {
        // 2x1 grid [0, 1] stretched to 4x1
        let mask = MaskTensor::new(vec![0.0, 1.0], vec![1, 1, 2]);
        let alpha = resample(&mask, 2, 1, 4, 1).unwrap();
        let expected = [0.0, 0.25, 0.75, 1.0];
        for (got, want) in alpha.as_slice().iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_resample_clamps_overshoot() {
        let mask = MaskTensor::new(vec![1.4, -0.3, 2.0, -1.0], vec![1, 2, 2]);
        let alpha = resample(&mask, 2, 2, 5, 5).unwrap();
        assert!(alpha.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_resample_rejects_short_data() {
        let mask = MaskTensor::new(vec![0.5; 10], vec![1, 4, 4]);
        let err = resample(&mask, 4, 4, 8, 8).unwrap_err();
        assert!(matches!(
            err,
            CutoutError::DimensionMismatch {
                stage: "resample",
                expected: 16,
                actual: 10
            }
        ));
    }

    #[test]
    fn test_resample_rejects_empty_grid() {
        let mask = MaskTensor::new(Vec::new(), vec![1, 0, 4]);
        assert!(resample(&mask, 4, 0, 8, 8).is_err());
    }

    #[test]
    fn test_mask_to_alpha_uses_declared_geometry() {
        let mask = uniform_mask(vec![1, 100, 200], 1.0);
        let alpha = mask_to_alpha(&mask, 50, 25).unwrap();
        assert_eq!(alpha.len(), 50 * 25);
        assert!(alpha.as_slice().iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }
}
