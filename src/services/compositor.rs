//! Alpha compositing and PNG encoding
//!
//! The working surface always has the source image's native size, which is
//! what keeps output dimensions independent of the model resolution.

use crate::{
    error::{CutoutError, Result},
    types::{AlphaBuffer, CompositeResult},
};
use image::{codecs::png::PngEncoder, DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};
use std::borrow::Cow;

/// Service that applies an alpha buffer to the original pixels
pub struct Compositor;

impl Compositor {
    /// Apply `alpha` to `image` and encode the result as an RGBA PNG
    ///
    /// # Errors
    /// - `DimensionMismatch` if `alpha.len() != width * height`
    /// - `SurfaceUnavailable` if the working surface cannot be allocated
    /// - `Encode` if PNG encoding fails
    pub fn composite(image: &DynamicImage, alpha: &AlphaBuffer) -> Result<CompositeResult> {
        let surface = Self::composite_rgba(image, alpha)?;
        let (width, height) = surface.dimensions();
        let png = Self::encode_png(&surface)?;
        Ok(CompositeResult::new(png, width, height))
    }

    /// Apply `alpha` to `image` without encoding
    ///
    /// RGB channels are copied unchanged; each alpha byte becomes
    /// `round(alpha * 255)`.
    ///
    /// # Errors
    /// `DimensionMismatch` or `SurfaceUnavailable`, as for `composite`
    pub fn composite_rgba(image: &DynamicImage, alpha: &AlphaBuffer) -> Result<RgbaImage> {
        let (width, height) = (image.width(), image.height());
        let pixel_count = width as usize * height as usize;

        if alpha.len() != pixel_count {
            return Err(CutoutError::dimension_mismatch(
                "compositing",
                pixel_count,
                alpha.len(),
            ));
        }

        let unavailable = || CutoutError::SurfaceUnavailable { width, height };

        let byte_len = pixel_count.checked_mul(4).ok_or_else(unavailable)?;
        let mut surface: Vec<u8> = Vec::new();
        surface
            .try_reserve_exact(byte_len)
            .map_err(|_| unavailable())?;

        let source: Cow<'_, RgbaImage> = match image.as_rgba8() {
            Some(rgba) => Cow::Borrowed(rgba),
            None => Cow::Owned(image.to_rgba8()),
        };
        surface.extend_from_slice(source.as_raw());

        for (pixel, a) in surface.chunks_exact_mut(4).zip(alpha.as_slice()) {
            if let Some(alpha_byte) = pixel.get_mut(3) {
                *alpha_byte = alpha_to_byte(*a);
            }
        }

        RgbaImage::from_raw(width, height, surface).ok_or_else(unavailable)
    }

    /// Encode an RGBA surface as an 8-bit PNG byte stream
    ///
    /// # Errors
    /// `Encode` on encoder failure
    pub fn encode_png(surface: &RgbaImage) -> Result<Vec<u8>> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png)
            .write_image(
                surface.as_raw(),
                surface.width(),
                surface.height(),
                ExtendedColorType::Rgba8,
            )
            .map_err(|e| CutoutError::encode(e.to_string()))?;
        Ok(png)
    }
}

/// Map alpha in `[0, 1]` to a byte, rounding to nearest
fn alpha_to_byte(alpha: f32) -> u8 {
    (alpha * 255.0).round().clamp(0.0, 255.0) as u8
}
