//! Pixel range normalization

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;

use super::{FloatImage, Transform};
use crate::error::Result;

/// Maps `[0, 1]` pixels to `[-1, 1]`
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalize;

impl Normalize {
    pub fn apply_in_place(image: &mut FloatImage) {
        for value in image.iter_mut() {
            *value = *value * 2.0 - 1.0;
        }
    }
}

impl Transform for Normalize {
    fn apply(&self, mut image: FloatImage, _rng: &mut StdRng) -> Result<FloatImage> {
        Self::apply_in_place(&mut image);
        Ok(image)
    }
}

/// Inverse of [`Normalize`]
pub fn denormalize(image: &FloatImage) -> FloatImage {
    let mut out = image.clone();
    for value in out.iter_mut() {
        *value = (*value + 1.0) / 2.0;
    }
    out
}

/// Convert a normalized image back to 8-bit RGB, clamping overshoot
pub fn to_rgb8(image: &FloatImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y).0;
        let channel = |v: f32| (((v + 1.0) / 2.0).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgb([channel(px[0]), channel(px[1]), channel(px[2])])
    })
}
