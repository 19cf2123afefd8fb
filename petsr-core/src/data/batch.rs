//! Elements and batches
//!
//! Pipeline elements are single images; batches stack them into NHWC
//! `ndarray` tensors ready for a training step.

use ndarray::{Array1, Array3, Array4, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::transform::FloatImage;

/// Discriminator target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Label {
    /// Bicubic-upsampled low-resolution image
    Bicubic = 0,
    /// Real high-resolution image
    Real = 1,
}

/// Low/high resolution pair produced from one source image
#[derive(Debug, Clone)]
pub struct SrPair {
    pub lr: FloatImage,
    pub hr: FloatImage,
}

/// Image with its discriminator label
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub image: FloatImage,
    pub label: Label,
}

/// Convert one image to an HWC array
pub fn image_to_array(image: &FloatImage) -> Result<Array3<f32>> {
    let (width, height) = image.dimensions();
    let shape = (height as usize, width as usize, 3);
    Array3::from_shape_vec(shape, image.as_raw().clone()).map_err(|_| PipelineError::ShapeMismatch {
        expected: vec![shape.0, shape.1, shape.2],
        actual: vec![image.as_raw().len()],
    })
}

/// Convert an HWC array (e.g. one slice of a batch) back to an image
pub fn array_to_image(array: ArrayView3<'_, f32>) -> Result<FloatImage> {
    let (height, width, channels) = array.dim();
    if channels != 3 {
        return Err(PipelineError::ShapeMismatch {
            expected: vec![height, width, 3],
            actual: vec![height, width, channels],
        });
    }
    FloatImage::from_raw(width as u32, height as u32, array.iter().copied().collect()).ok_or_else(|| {
        PipelineError::Internal {
            message: format!("buffer does not fit {}x{} image", height, width),
        }
    })
}

/// Stack equally-sized images into an NHWC tensor
pub fn stack(images: &[&FloatImage]) -> Result<Array4<f32>> {
    let first = images.first().ok_or_else(|| PipelineError::Internal {
        message: "cannot stack an empty batch".into(),
    })?;
    let (width, height) = first.dimensions();
    let shape = [height as usize, width as usize, 3];

    let mut batch = Array4::<f32>::zeros((images.len(), shape[0], shape[1], shape[2]));
    for (mut slot, image) in batch.axis_iter_mut(Axis(0)).zip(images) {
        if image.dimensions() != (width, height) {
            return Err(PipelineError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![image.height() as usize, image.width() as usize, 3],
            });
        }
        slot.assign(&image_to_array(image)?);
    }
    Ok(batch)
}

/// Common accessors for batches handed to consumers
pub trait Batch: Send + 'static {
    /// Number of elements
    fn len(&self) -> usize;

    /// Sequence number of the batch within the stream
    fn index(&self) -> u64;

    /// Size of the tensor payload in bytes
    fn payload_bytes(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batch of `(lr, hr)` pairs
#[derive(Debug, Clone)]
pub struct SrBatch {
    /// `[N, H/f, W/f, 3]`
    pub lr: Array4<f32>,
    /// `[N, H, W, 3]`
    pub hr: Array4<f32>,
    pub index: u64,
    /// Epoch of the last element in the batch
    pub epoch: u64,
}

impl Batch for SrBatch {
    fn len(&self) -> usize {
        self.hr.len_of(Axis(0))
    }

    fn index(&self) -> u64 {
        self.index
    }

    fn payload_bytes(&self) -> usize {
        (self.lr.len() + self.hr.len()) * std::mem::size_of::<f32>()
    }
}

/// Batch of `(image, label)` pairs
#[derive(Debug, Clone)]
pub struct DiscriminatorBatch {
    /// `[N, H, W, 3]`
    pub images: Array4<f32>,
    /// `[N]`, 1 = real, 0 = bicubic
    pub labels: Array1<u8>,
    pub index: u64,
    pub epoch: u64,
}

impl Batch for DiscriminatorBatch {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn index(&self) -> u64 {
        self.index
    }

    fn payload_bytes(&self) -> usize {
        self.images.len() * std::mem::size_of::<f32>() + self.labels.len()
    }
}

/// Elements that know how to collate into a batch
pub trait Collate: Sized + Send + 'static {
    type Output: Batch;

    fn collate(items: Vec<Self>, index: u64, epoch: u64) -> Result<Self::Output>;
}

impl Collate for SrPair {
    type Output = SrBatch;

    fn collate(items: Vec<Self>, index: u64, epoch: u64) -> Result<SrBatch> {
        let lr: Vec<&FloatImage> = items.iter().map(|p| &p.lr).collect();
        let hr: Vec<&FloatImage> = items.iter().map(|p| &p.hr).collect();
        Ok(SrBatch {
            lr: stack(&lr)?,
            hr: stack(&hr)?,
            index,
            epoch,
        })
    }
}

impl Collate for LabeledImage {
    type Output = DiscriminatorBatch;

    fn collate(items: Vec<Self>, index: u64, epoch: u64) -> Result<DiscriminatorBatch> {
        let images: Vec<&FloatImage> = items.iter().map(|e| &e.image).collect();
        let labels = items.iter().map(|e| e.label as u8).collect();
        Ok(DiscriminatorBatch {
            images: stack(&images)?,
            labels,
            index,
            epoch,
        })
    }
}

/// Groups elements into fixed-size batches
#[derive(Debug)]
pub struct Batcher<T> {
    batch_size: usize,
    pending: Vec<T>,
    next_index: u64,
}

impl<T: Collate> Batcher<T> {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
            next_index: 0,
        }
    }

    /// Add an element; returns a batch once `batch_size` elements are pending
    pub fn push(&mut self, item: T, epoch: u64) -> Result<Option<T::Output>> {
        self.pending.push(item);
        if self.pending.len() >= self.batch_size {
            return self.emit(epoch).map(Some);
        }
        Ok(None)
    }

    /// Emit whatever is pending as a final, possibly short, batch
    pub fn flush(&mut self, epoch: u64) -> Result<Option<T::Output>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        self.emit(epoch).map(Some)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn emit(&mut self, epoch: u64) -> Result<T::Output> {
        let items = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let index = self.next_index;
        self.next_index += 1;
        T::collate(items, index, epoch)
    }
}
