//! Image preprocessing.
//!
//! Images are converted to RGB, resized to a square target and normalized
//! with ImageNet statistics into a CHW float buffer.

use std::path::Path;

use gatenet_core::{Error, Result};
use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb};
use serde::{Deserialize, Serialize};

/// Configuration for image preprocessing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Square output size
    pub image_size: u32,
    /// Normalization means [R, G, B]
    pub mean: [f32; 3],
    /// Normalization standard deviations [R, G, B]
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            // ImageNet normalization values
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl PreprocessConfig {
    /// ImageNet statistics at a custom size
    pub fn with_image_size(image_size: u32) -> Self {
        Self {
            image_size,
            ..Self::default()
        }
    }
}

/// Turns decoded images into normalized CHW buffers
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Preprocesses an image for model input
    pub fn preprocess(&self, image: &DynamicImage) -> Vec<f32> {
        let size = self.config.image_size;
        let rgb = image.to_rgb8();
        let resized = if rgb.dimensions() == (size, size) {
            rgb
        } else {
            image::imageops::resize(&rgb, size, size, FilterType::Triangle)
        };
        self.normalize(&resized)
    }

    /// Loads and preprocesses an image file
    pub fn preprocess_from_path(&self, path: &Path) -> Result<Vec<f32>> {
        let image = image::open(path).map_err(|e| {
            Error::Image(format!("Failed to load image {}: {}", path.display(), e))
        })?;
        Ok(self.preprocess(&image))
    }

    /// Output shape `[channels, height, width]`
    pub fn output_shape(&self) -> [usize; 3] {
        let size = self.config.image_size as usize;
        [3, size, size]
    }

    /// Number of floats per preprocessed image
    pub fn output_len(&self) -> usize {
        self.output_shape().iter().product()
    }

    fn normalize(&self, image: &ImageBuffer<Rgb<u8>, Vec<u8>>) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let mut normalized = Vec::with_capacity((width * height) as usize * 3);
        for channel in 0..3 {
            for pixel in image.pixels() {
                let value = pixel[channel] as f32 / 255.0;
                normalized.push((value - self.config.mean[channel]) / self.config.std[channel]);
            }
        }
        normalized
    }
}
