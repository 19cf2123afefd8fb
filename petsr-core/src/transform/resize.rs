//! Resizing, LR derivation and bicubic upsampling

use image::imageops::{self, FilterType};
use rand::rngs::StdRng;

use super::{FloatImage, Transform};
use crate::error::{PipelineError, Result};

/// Resize `image` to `height` x `width`
pub fn resize(image: &FloatImage, height: u32, width: u32, filter: FilterType) -> Result<FloatImage> {
    if height == 0 || width == 0 {
        return Err(PipelineError::InvalidSize {
            reason: format!("cannot resize to {}x{}", height, width),
        });
    }
    if image.height() == height && image.width() == width {
        return Ok(image.clone());
    }
    Ok(imageops::resize(image, width, height, filter))
}

/// Spatial size of the low-resolution counterpart of a `height` x `width` image
pub fn lr_dims(height: u32, width: u32, factor: u32) -> Result<(u32, u32)> {
    if factor == 0 {
        return Err(PipelineError::InvalidSize {
            reason: "downsampling factor must be positive".into(),
        });
    }
    let (lr_h, lr_w) = (height / factor, width / factor);
    if lr_h == 0 || lr_w == 0 {
        return Err(PipelineError::InvalidSize {
            reason: format!(
                "{}x{} is smaller than downsampling factor {}",
                height, width, factor
            ),
        });
    }
    Ok((lr_h, lr_w))
}

/// Derive the low-resolution image by bicubic downsampling
pub fn downsample(image: &FloatImage, factor: u32) -> Result<FloatImage> {
    let (lr_h, lr_w) = lr_dims(image.height(), image.width(), factor)?;
    resize(image, lr_h, lr_w, FilterType::CatmullRom)
}

/// Bicubic upsampling back to the high-resolution size
pub fn bicubic_upsample(image: &FloatImage, height: u32, width: u32) -> Result<FloatImage> {
    resize(image, height, width, FilterType::CatmullRom)
}

/// Deterministic resize transform
#[derive(Debug, Clone, Copy)]
pub struct Resize {
    pub height: u32,
    pub width: u32,
    pub filter: FilterType,
}

impl Resize {
    pub fn bilinear(height: u32, width: u32) -> Self {
        Self {
            height,
            width,
            filter: FilterType::Triangle,
        }
    }
}

impl Transform for Resize {
    fn apply(&self, image: FloatImage, _rng: &mut StdRng) -> Result<FloatImage> {
        resize(&image, self.height, self.width, self.filter)
    }
}
