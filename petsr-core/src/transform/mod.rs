//! Per-element image transforms
//!
//! Images flow through the pipeline as `f32` RGB buffers. Decoded pixels are
//! in `[0, 1]`; [`Normalize`] moves them to `[-1, 1]`. Resampling clamps
//! float pixels to `[0, 1]`, so every resize must happen before
//! normalization.

pub mod jitter;
pub mod normalize;
pub mod resize;

use image::{DynamicImage, Rgb32FImage, RgbImage};
use rand::rngs::StdRng;

use crate::error::Result;

pub use jitter::RandomJitter;
pub use normalize::{denormalize, to_rgb8, Normalize};
pub use resize::{bicubic_upsample, downsample, lr_dims, resize, Resize};

/// Float RGB image, interleaved HWC
pub type FloatImage = Rgb32FImage;

/// Convert a decoded 8-bit image to floats in `[0, 1]`
pub fn to_float(image: RgbImage) -> FloatImage {
    DynamicImage::ImageRgb8(image).into_rgb32f()
}

/// A single per-element step
pub trait Transform: Send + Sync {
    /// Apply the transform. Random transforms draw from `rng`.
    fn apply(&self, image: FloatImage, rng: &mut StdRng) -> Result<FloatImage>;
}

/// Chain of transforms applied in order
#[derive(Default)]
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transform
    pub fn add<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Transform for Compose {
    fn apply(&self, mut image: FloatImage, rng: &mut StdRng) -> Result<FloatImage> {
        for transform in &self.transforms {
            image = transform.apply(image, rng)?;
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_to_float_range() {
        let image = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let float = to_float(image);
        assert_eq!(float.get_pixel(0, 0).0, [0.0, 0.0, 0.0]);
        assert_eq!(float.get_pixel(1, 0).0, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_compose_applies_in_order() {
        let mut rng = StdRng::seed_from_u64(0);
        let image = FloatImage::from_pixel(16, 16, image::Rgb([1.0, 1.0, 1.0]));
        let pipeline = Compose::new().add(Resize::bilinear(8, 4)).add(Normalize);
        assert_eq!(pipeline.len(), 2);

        let out = pipeline.apply(image, &mut rng).unwrap();
        assert_eq!(out.dimensions(), (4, 8));
        for px in out.pixels() {
            for c in px.0 {
                assert!((c - 1.0).abs() < 1e-5);
            }
        }
    }
}
