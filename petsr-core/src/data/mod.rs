//! Data loading pipeline
//!
//! Catalog, image sources, batching, interleaving, the prefetching producer
//! and the device stage.

pub mod batch;
pub mod dataset;
pub mod device;
pub mod interleave;
pub mod loader;
pub mod prefetcher;
pub mod source;

pub use batch::{Batch, DiscriminatorBatch, Label, LabeledImage, SrBatch, SrPair};
pub use dataset::{DatasetMetadata, PetCatalog, PetRecord, Species, Split};
pub use device::{Device, DeviceTransfer, HostDevice};
pub use interleave::PairSampler;
pub use loader::{DataLoader, DataLoaderConfig, DataLoaderState};
pub use prefetcher::{ElementMapper, PassThrough, Prefetcher, PrefetcherConfig, Regroup};
pub use source::{FsImageSource, ImageSource, MemoryImageSource};
