//! Image to model-input tensor conversion
//!
//! Letterboxes an arbitrary-size image into the fixed `S x S` model input,
//! then writes the normalized channels in planar (NCHW) order.

use crate::{
    config::MODEL_INPUT_SIZE,
    error::{CutoutError, Result},
    types::Tensor,
};
use image::{imageops::FilterType, DynamicImage, GenericImageView, Rgb, RgbImage};

/// Configuration for preprocessing behavior
#[derive(Debug, Clone)]
pub struct PreprocessingOptions {
    /// Fill color for the letterbox bars (RGB)
    pub padding_color: [u8; 3],
    /// Whether to return the letterboxed canvas for debugging
    pub return_preprocessed_image: bool,
}

impl Default for PreprocessingOptions {
    fn default() -> Self {
        Self {
            padding_color: [0, 0, 0], // Black padding
            return_preprocessed_image: false,
        }
    }
}

/// Placement of a scaled image inside the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
    /// Uniform scale factor `min(S / w, S / h)`
    pub scale: f64,
    pub draw_width: u32,
    pub draw_height: u32,
    /// Centering offsets, possibly fractional
    pub offset_x: f64,
    pub offset_y: f64,
    pub target_size: u32,
}

impl LetterboxGeometry {
    /// Compute the letterbox placement of a `width x height` image in a `target x target` square
    ///
    /// # Errors
    /// `InvalidImage` if either dimension is zero
    pub fn compute(width: u32, height: u32, target_size: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CutoutError::InvalidImage { width, height });
        }

        let target = f64::from(target_size);
        let scale = (target / f64::from(width)).min(target / f64::from(height));

        let draw_width = (f64::from(width) * scale).round().min(target) as u32;
        let draw_height = (f64::from(height) * scale).round().min(target) as u32;

        Ok(Self {
            scale,
            draw_width,
            draw_height,
            offset_x: (target - f64::from(draw_width)) / 2.0,
            offset_y: (target - f64::from(draw_height)) / 2.0,
            target_size,
        })
    }

    /// Integer pixel origin of the drawn rectangle
    #[must_use]
    pub fn pixel_origin(&self) -> (u32, u32) {
        (self.offset_x.floor() as u32, self.offset_y.floor() as u32)
    }
}

/// Image preprocessing for model inference
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Convert an image to the `[1, 3, 320, 320]` model input tensor
    ///
    /// # Errors
    /// `InvalidImage` if the image has a zero dimension
    pub fn to_tensor(image: &DynamicImage) -> Result<Tensor> {
        let (_, tensor) = Self::preprocess_image(image, &PreprocessingOptions::default())?;
        Ok(tensor)
    }

    /// Letterbox and normalize with explicit options
    ///
    /// Steps:
    /// - aspect-preserving scale so the image fits inside the square
    /// - draw centered onto a canvas pre-filled with the padding color,
    ///   compositing any source alpha over that canvas
    /// - write `channel / 255` into the R, G, B planes; canvas alpha is dropped
    ///
    /// # Returns
    /// * `Ok((canvas_opt, tensor))` - letterboxed canvas (if requested) and tensor
    /// * `Err(CutoutError)` - on non-positive dimensions
    pub fn preprocess_image(
        image: &DynamicImage,
        options: &PreprocessingOptions,
    ) -> Result<(Option<DynamicImage>, Tensor)> {
        let (width, height) = image.dimensions();
        let geometry = LetterboxGeometry::compute(width, height, MODEL_INPUT_SIZE)?;

        let canvas = Self::render_letterbox(image, &geometry, options.padding_color);
        let tensor = Self::canvas_to_tensor(&canvas)?;

        tracing::debug!(
            original_width = width,
            original_height = height,
            draw_width = geometry.draw_width,
            draw_height = geometry.draw_height,
            scale = geometry.scale,
            "Letterboxed image into model input"
        );

        let preprocessed = if options.return_preprocessed_image {
            Some(DynamicImage::ImageRgb8(canvas))
        } else {
            None
        };

        Ok((preprocessed, tensor))
    }

    /// Draw the scaled image into the padded square canvas
    fn render_letterbox(
        image: &DynamicImage,
        geometry: &LetterboxGeometry,
        padding: [u8; 3],
    ) -> RgbImage {
        let size = geometry.target_size;
        let mut canvas = RgbImage::from_pixel(size, size, Rgb(padding));

        // A degenerate sliver can round to zero pixels; nothing is drawn then
        if geometry.draw_width == 0 || geometry.draw_height == 0 {
            return canvas;
        }

        let resized = image::imageops::resize(
            &image.to_rgba8(),
            geometry.draw_width,
            geometry.draw_height,
            FilterType::Triangle,
        );

        let (origin_x, origin_y) = geometry.pixel_origin();
        for (x, y, pixel) in resized.enumerate_pixels() {
            let canvas_x = x + origin_x;
            let canvas_y = y + origin_y;
            if canvas_x >= size || canvas_y >= size {
                continue;
            }
            let alpha = u32::from(pixel[3]);
            let blend = |src: u8, dst: u8| -> u8 {
                ((u32::from(src) * alpha + u32::from(dst) * (255 - alpha) + 127) / 255) as u8
            };
            let background = *canvas.get_pixel(canvas_x, canvas_y);
            canvas.put_pixel(
                canvas_x,
                canvas_y,
                Rgb([
                    blend(pixel[0], background[0]),
                    blend(pixel[1], background[1]),
                    blend(pixel[2], background[2]),
                ]),
            );
        }

        canvas
    }

    /// Convert the canvas to a normalized planar tensor
    fn canvas_to_tensor(canvas: &RgbImage) -> Result<Tensor> {
        let (width, height) = canvas.dimensions();
        let plane = width as usize * height as usize;

        let mut red = Vec::with_capacity(plane);
        let mut green = Vec::with_capacity(plane);
        let mut blue = Vec::with_capacity(plane);

        // `pixels()` walks row-major, so push order equals the linear index y * S + x
        for pixel in canvas.pixels() {
            red.push(f32::from(pixel[0]) / 255.0);
            green.push(f32::from(pixel[1]) / 255.0);
            blue.push(f32::from(pixel[2]) / 255.0);
        }

        let mut data = red;
        data.extend(green);
        data.extend(blue);

        Tensor::from_planar([1, 3, height as usize, width as usize], data)
    }
}
