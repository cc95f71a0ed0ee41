//! This module provides tools for preparing images before they are fed into a model.
//!
//! It defines the `ImageProcessor` trait for generic image processing operations
//! and provides a concrete implementation, `ImagePreprocessor`, which flattens
//! transparency, pads to a square, resizes and orders the color channels the way
//! the WD tagger family expects.

use std::path::Path;

use image::{
    error::{ParameterError, ParameterErrorKind},
    imageops,
    imageops::FilterType,
    DynamicImage, ImageError, ImageReader, Rgb, RgbImage,
};
use ndarray::{Array, Array3, Axis, Ix4};

use crate::error::{Result, TaggerError};

/// Color used for both the transparency backdrop and the square padding.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// A trait for processing images into tensors suitable for model input.
pub trait ImageProcessor {
    /// Processes a single image into a `[height, width, channels]` buffer.
    fn process(&self, image: &DynamicImage) -> Result<Array3<f32>>;

    /// Decodes the file at `path` and processes it.
    fn load<P: AsRef<Path>>(&self, path: P) -> Result<Array3<f32>> {
        let image = ImageReader::open(path.as_ref())?
            .with_guessed_format()?
            .decode()?;
        self.process(&image)
    }
}

/// Stacks prepared buffers into a single `[batch, height, width, channels]` tensor.
pub fn stack_batch(buffers: &[Array3<f32>]) -> Result<Array<f32, Ix4>> {
    let views = buffers.iter().map(|b| b.view()).collect::<Vec<_>>();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| TaggerError::Inference(format!("Failed to stack batch: {}", e)))
}

/// A preprocessor that flattens, pads and resizes images to a square input.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    pub size: u32,
    pub bgr: bool,
}

impl ImagePreprocessor {
    /// Creates a new `ImagePreprocessor`.
    pub fn new(size: u32, bgr: bool) -> Self {
        Self { size, bgr }
    }

    /// Composites the image over a white backdrop, dropping the alpha channel.
    fn flatten(image: &DynamicImage) -> RgbImage {
        if !image.color().has_alpha() {
            return image.to_rgb8();
        }

        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut flat = RgbImage::from_pixel(width, height, BACKGROUND);
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            let alpha = a as f32 / 255.0;
            let blend = |c: u8, bg: u8| (c as f32 * alpha + bg as f32 * (1.0 - alpha)).round() as u8;
            flat.put_pixel(
                x,
                y,
                Rgb([
                    blend(r, BACKGROUND.0[0]),
                    blend(g, BACKGROUND.0[1]),
                    blend(b, BACKGROUND.0[2]),
                ]),
            );
        }
        flat
    }

    /// Centers the image on a square canvas sized to its longer side.
    fn pad_to_square(image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let max_dim = width.max(height);
        if width == height {
            return image.clone();
        }

        let mut padded = RgbImage::from_pixel(max_dim, max_dim, BACKGROUND);
        let pad_left = (max_dim - width) / 2;
        let pad_top = (max_dim - height) / 2;
        imageops::overlay(&mut padded, image, pad_left as i64, pad_top as i64);
        padded
    }

    fn to_tensor(&self, image: &RgbImage) -> Array3<f32> {
        let mut tensor = Array3::zeros((self.size as usize, self.size as usize, 3));
        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let ordered = if self.bgr { [b, g, r] } else { [r, g, b] };
            for (c, value) in ordered.into_iter().enumerate() {
                tensor[[y as usize, x as usize, c]] = value as f32;
            }
        }
        tensor
    }
}

impl ImageProcessor for ImagePreprocessor {
    fn process(&self, image: &DynamicImage) -> Result<Array3<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TaggerError::Image(ImageError::Parameter(
                ParameterError::from_kind(ParameterErrorKind::DimensionMismatch),
            )));
        }

        let flat = Self::flatten(image);
        let padded = Self::pad_to_square(&flat);

        let square = if padded.width() != self.size {
            imageops::resize(&padded, self.size, self.size, FilterType::CatmullRom)
        } else {
            padded
        };

        Ok(self.to_tensor(&square))
    }
}
