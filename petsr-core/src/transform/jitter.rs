//! Random jitter augmentation
//!
//! Upscale by 30/256 of each side, take a random crop of the target size and
//! mirror it horizontally half of the time.

use image::imageops::{self, FilterType};
use rand::rngs::StdRng;
use rand::Rng;

use super::resize::resize;
use super::{FloatImage, Transform};
use crate::error::Result;

const JITTER_NUMERATOR: u32 = 30;
const JITTER_DENOMINATOR: u32 = 256;

/// Resize-up, random-crop, random-flip
#[derive(Debug, Clone, Copy)]
pub struct RandomJitter {
    pub height: u32,
    pub width: u32,
    pub flip_probability: f64,
}

impl RandomJitter {
    pub fn new(height: u32, width: u32) -> Self {
        Self {
            height,
            width,
            flip_probability: 0.5,
        }
    }

    /// Size the image is scaled to before cropping
    pub fn enlarged_dims(&self) -> (u32, u32) {
        let grow = |v: u32| v + v * JITTER_NUMERATOR / JITTER_DENOMINATOR;
        (grow(self.height), grow(self.width))
    }
}

impl Transform for RandomJitter {
    fn apply(&self, image: FloatImage, rng: &mut StdRng) -> Result<FloatImage> {
        let (big_h, big_w) = self.enlarged_dims();
        let enlarged = resize(&image, big_h, big_w, FilterType::Triangle)?;

        let x = rng.gen_range(0..=big_w - self.width);
        let y = rng.gen_range(0..=big_h - self.height);
        let cropped = imageops::crop_imm(&enlarged, x, y, self.width, self.height).to_image();

        if rng.gen_bool(self.flip_probability) {
            Ok(imageops::flip_horizontal(&cropped))
        } else {
            Ok(cropped)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;

    fn ramp(width: u32, height: u32) -> FloatImage {
        FloatImage::from_fn(width, height, |x, _| {
            let v = x as f32 / width as f32;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn test_enlarged_dims() {
        assert_eq!(RandomJitter::new(256, 256).enlarged_dims(), (286, 286));
        assert_eq!(RandomJitter::new(224, 112).enlarged_dims(), (250, 125));
    }

    #[test]
    fn test_output_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let jitter = RandomJitter::new(24, 32);
        for _ in 0..10 {
            let out = jitter.apply(ramp(50, 40), &mut rng).unwrap();
            assert_eq!(out.dimensions(), (32, 24));
        }
    }

    #[test]
    fn test_always_flip() {
        let mut rng = StdRng::seed_from_u64(3);
        let jitter = RandomJitter {
            flip_probability: 1.0,
            ..RandomJitter::new(16, 16)
        };
        let out = jitter.apply(ramp(16, 16), &mut rng).unwrap();
        // Ramp increases left to right; flipped it decreases.
        assert!(out.get_pixel(0, 8).0[0] > out.get_pixel(15, 8).0[0]);
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let jitter = RandomJitter::new(16, 16);
        let a = jitter.apply(ramp(30, 30), &mut StdRng::seed_from_u64(11)).unwrap();
        let b = jitter.apply(ramp(30, 30), &mut StdRng::seed_from_u64(11)).unwrap();
        assert_eq!(a, b);
    }
}
