//! petsr core - Oxford-IIIT Pet input pipelines for super-resolution
//!
//! This crate builds the batched, prefetched input streams used to train and
//! evaluate a super-resolution model and its discriminator:
//! - Catalog reading for the published Oxford-IIIT Pet layout
//! - Per-element augmentation, resizing and LR derivation
//! - Parallel mapping, batching and prefetching on Tokio
//! - A device stage placing batches where the consumer reads them

pub mod config;
pub mod data;
pub mod datasets;
pub mod error;
pub mod metrics;
pub mod runtime;
pub mod transform;

pub use config::{ImageSize, PipelineConfig};
pub use data::{DataLoader, DiscriminatorBatch, Split, SrBatch};
pub use datasets::{oxford_iiit_pet_dataset, oxford_iiit_pet_dataset_d};
pub use error::{PipelineError, Result};
pub use runtime::PipelineRuntime;

/// Default batch size
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default LR downsampling factor
pub const DEFAULT_DOWNSAMPLING_FACTOR: u32 = 4;

/// Host prefetch buffer of the SR pipeline, in batches
pub const DEFAULT_SR_PREFETCH: usize = 16;

/// Host prefetch buffer of the discriminator pipeline, in batches
pub const DEFAULT_DISCRIMINATOR_PREFETCH: usize = 8;

/// Batches buffered after the device stage
pub const DEFAULT_DEVICE_BUFFER_SIZE: usize = 1;
