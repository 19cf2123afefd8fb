//! Image sources
//!
//! Loading and decoding of the raw image behind a [`PetRecord`]. Sources are
//! synchronous; the pipeline calls them from the blocking pool.

use bytes::Bytes;
use image::RgbImage;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::time::Instant;

use super::dataset::PetRecord;
use crate::error::{PipelineError, Result};
use crate::metrics::standard;

/// Something that can produce the decoded RGB image of a record
pub trait ImageSource: Send + Sync + 'static {
    /// Load and decode the image for `record`
    fn load(&self, record: &PetRecord) -> Result<RgbImage>;
}

fn decode(name: &str, data: &[u8]) -> Result<RgbImage> {
    let start = Instant::now();
    let image = image::load_from_memory(data).map_err(|e| PipelineError::ImageDecode {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    // Some pet images are grayscale or RGBA; everything downstream is RGB.
    let rgb = image.to_rgb8();
    standard::IMAGES_DECODED.inc();
    standard::DECODE_DURATION.observe(start.elapsed().as_secs_f64());
    Ok(rgb)
}

/// Reads image files from disk
#[derive(Debug, Default, Clone)]
pub struct FsImageSource;

impl FsImageSource {
    pub fn new() -> Self {
        Self
    }
}

impl ImageSource for FsImageSource {
    fn load(&self, record: &PetRecord) -> Result<RgbImage> {
        let data = std::fs::read(&record.image_path).map_err(|source| PipelineError::ImageRead {
            path: record.image_path.clone(),
            source,
        })?;
        standard::BYTES_READ.inc_by(data.len() as u64);
        decode(&record.name, &data)
    }
}

/// Encoded images held in memory, keyed by record name
#[derive(Default)]
pub struct MemoryImageSource {
    images: RwLock<HashMap<String, Bytes>>,
}

impl MemoryImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert already-encoded image bytes
    pub fn insert(&self, name: impl Into<String>, data: Bytes) {
        self.images.write().insert(name.into(), data);
    }

    /// Encode `image` as PNG and insert it
    pub fn insert_image(&self, name: impl Into<String>, image: RgbImage) -> Result<()> {
        let name = name.into();
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .map_err(|e| PipelineError::ImageWrite {
                path: name.clone().into(),
                reason: e.to_string(),
            })?;
        self.insert(name, Bytes::from(buf));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.read().is_empty()
    }
}

impl ImageSource for MemoryImageSource {
    fn load(&self, record: &PetRecord) -> Result<RgbImage> {
        let data = self
            .images
            .read()
            .get(&record.name)
            .cloned()
            .ok_or_else(|| PipelineError::ImageNotFound {
                name: record.name.clone(),
            })?;
        decode(&record.name, &data)
    }
}
