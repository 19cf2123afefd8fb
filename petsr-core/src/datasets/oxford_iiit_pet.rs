//! Oxford-IIIT Pet pipelines
//!
//! Two near-identical pipelines over the same per-element preparation
//! (train: random jitter, test: resize). Every output image is normalized
//! to `[-1, 1]` once all resampling is done:
//!
//! - the SR pipeline pairs every high-resolution image with its bicubic
//!   downsampled low-resolution version;
//! - the discriminator pipeline labels the high-resolution image `1` and
//!   the bicubic upsampling of its low-resolution version `0`, and
//!   interleaves both at random.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::batch::{DiscriminatorBatch, Label, LabeledImage, SrBatch, SrPair};
use crate::data::dataset::{PetCatalog, PetRecord, Split};
use crate::data::device::{Device, DeviceTransfer, HostDevice};
use crate::data::interleave::PairSampler;
use crate::data::loader::{DataLoader, DataLoaderConfig};
use crate::data::prefetcher::{ElementMapper, PassThrough, PrefetcherConfig};
use crate::data::source::{FsImageSource, ImageSource};
use crate::error::{PipelineError, Result};
use crate::runtime::PipelineRuntime;
use crate::transform::{
    bicubic_upsample, downsample, to_float, Compose, FloatImage, Normalize, RandomJitter, Resize,
    Transform,
};
use crate::{DEFAULT_DISCRIMINATOR_PREFETCH, DEFAULT_SR_PREFETCH};

/// Records of one split plus the source that decodes them
pub struct PetInputs {
    pub records: Vec<PetRecord>,
    pub source: Arc<dyn ImageSource>,
}

impl PetInputs {
    /// Read the split from an on-disk catalog, decoding from the filesystem
    pub fn from_catalog(config: &PipelineConfig) -> Result<Self> {
        let catalog = PetCatalog::open(&config.data_dir)?.with_strict_counts(config.strict_counts);
        Ok(Self {
            records: catalog.records(config.split)?,
            source: Arc::new(FsImageSource::new()),
        })
    }
}

/// Augmentation for training, deterministic resize for evaluation
fn preparation(config: &PipelineConfig) -> Compose {
    let (height, width) = (config.size.height, config.size.width);
    match config.split {
        Split::Train => Compose::new().add(RandomJitter::new(height, width)),
        Split::Test => Compose::new().add(Resize::bilinear(height, width)),
    }
}

/// Load and prepare one high-resolution image, still in `[0, 1]`
fn prepare_hr(
    source: &dyn ImageSource,
    preparation: &Compose,
    record: &PetRecord,
    rng: &mut StdRng,
) -> Result<FloatImage> {
    let decoded = source.load(record)?;
    preparation.apply(to_float(decoded), rng)
}

/// Maps a record to an `(lr, hr)` pair
pub struct SrMapper {
    source: Arc<dyn ImageSource>,
    preparation: Compose,
    downsampling_factor: u32,
}

impl SrMapper {
    pub fn new(source: Arc<dyn ImageSource>, config: &PipelineConfig) -> Self {
        Self {
            source,
            preparation: preparation(config),
            downsampling_factor: config.downsampling_factor,
        }
    }
}

impl ElementMapper for SrMapper {
    type Output = SrPair;

    fn map(&self, record: &PetRecord, rng: &mut StdRng) -> Result<SrPair> {
        let mut hr = prepare_hr(self.source.as_ref(), &self.preparation, record, rng)?;
        let mut lr = downsample(&hr, self.downsampling_factor)?;
        Normalize::apply_in_place(&mut hr);
        Normalize::apply_in_place(&mut lr);
        Ok(SrPair { lr, hr })
    }
}

/// Maps a record to its real and bicubic-reconstructed labelled images
pub struct DiscriminatorMapper {
    source: Arc<dyn ImageSource>,
    preparation: Compose,
    downsampling_factor: u32,
}

impl DiscriminatorMapper {
    pub fn new(source: Arc<dyn ImageSource>, config: &PipelineConfig) -> Self {
        Self {
            source,
            preparation: preparation(config),
            downsampling_factor: config.downsampling_factor,
        }
    }
}

impl ElementMapper for DiscriminatorMapper {
    type Output = (LabeledImage, LabeledImage);

    fn map(&self, record: &PetRecord, rng: &mut StdRng) -> Result<Self::Output> {
        let mut hr = prepare_hr(self.source.as_ref(), &self.preparation, record, rng)?;
        let lr = downsample(&hr, self.downsampling_factor)?;
        let mut bicubic = bicubic_upsample(&lr, hr.height(), hr.width())?;
        Normalize::apply_in_place(&mut hr);
        Normalize::apply_in_place(&mut bicubic);
        Ok((
            LabeledImage {
                image: hr,
                label: Label::Real,
            },
            LabeledImage {
                image: bicubic,
                label: Label::Bicubic,
            },
        ))
    }
}

fn loader_config(config: &PipelineConfig, seed: u64, default_prefetch: usize) -> DataLoaderConfig {
    DataLoaderConfig {
        prefetch: PrefetcherConfig {
            batch_size: config.batch_size,
            num_parallel_calls: config.parallel_calls(),
            repeat: config.repeat,
            shuffle: config.shuffle,
            seed,
        },
        host_buffer: config.prefetch.unwrap_or(default_prefetch),
        device_buffer: config.device_buffer,
    }
}

fn resolve_seed(config: &PipelineConfig) -> u64 {
    config.seed.unwrap_or_else(rand::random)
}

fn check_device<B>(config: &PipelineConfig, device: &dyn DeviceTransfer<B>) -> Result<()>
where
    B: crate::data::batch::Batch,
{
    if device.device() != config.device {
        return Err(PipelineError::InvalidConfig {
            reason: format!(
                "config targets {} but the device transfer places on {}",
                config.device,
                device.device()
            ),
        });
    }
    Ok(())
}

/// SR pipeline over explicit inputs and device
///
/// Returns the loader and the published element count of the split.
pub fn sr_pipeline(
    runtime: &PipelineRuntime,
    inputs: PetInputs,
    config: &PipelineConfig,
    device: Arc<dyn DeviceTransfer<SrBatch>>,
) -> Result<(DataLoader<SrBatch>, usize)> {
    config.validate()?;
    check_device(config, device.as_ref())?;

    let count = config.split.published_count();
    let seed = resolve_seed(config);
    let mapper = SrMapper::new(inputs.source, config);

    info!(
        "Building SR pipeline: split={} size={}x{} factor={} batch={}",
        config.split, config.size.height, config.size.width, config.downsampling_factor, config.batch_size
    );

    let loader = DataLoader::spawn(
        runtime,
        inputs.records,
        mapper,
        PassThrough,
        device,
        config.split,
        count,
        loader_config(config, seed, DEFAULT_SR_PREFETCH),
    );
    Ok((loader, count))
}

/// Discriminator pipeline over explicit inputs and device
///
/// Every source image yields two elements, so the count is doubled.
pub fn discriminator_pipeline(
    runtime: &PipelineRuntime,
    inputs: PetInputs,
    config: &PipelineConfig,
    device: Arc<dyn DeviceTransfer<DiscriminatorBatch>>,
) -> Result<(DataLoader<DiscriminatorBatch>, usize)> {
    config.validate()?;
    check_device(config, device.as_ref())?;

    let count = config.split.published_count() * 2;
    let seed = resolve_seed(config);
    let mapper = DiscriminatorMapper::new(inputs.source, config);
    let sampler = PairSampler::new(StdRng::seed_from_u64(seed.rotate_left(17)));

    info!(
        "Building discriminator pipeline: split={} size={}x{} factor={} batch={}",
        config.split, config.size.height, config.size.width, config.downsampling_factor, config.batch_size
    );

    let loader = DataLoader::spawn(
        runtime,
        inputs.records,
        mapper,
        sampler,
        device,
        config.split,
        count,
        loader_config(config, seed, DEFAULT_DISCRIMINATOR_PREFETCH),
    );
    Ok((loader, count))
}

fn host_only(config: &PipelineConfig) -> Result<HostDevice> {
    match config.device {
        Device::Cpu => Ok(HostDevice),
        ref other => Err(PipelineError::InvalidConfig {
            reason: format!(
                "no built-in transfer for {}; supply a DeviceTransfer to sr_pipeline/discriminator_pipeline",
                other
            ),
        }),
    }
}

/// `(lr, hr)` batches of the on-disk dataset and the split's element count
pub fn oxford_iiit_pet_dataset(
    runtime: &PipelineRuntime,
    config: &PipelineConfig,
) -> Result<(DataLoader<SrBatch>, usize)> {
    let device = host_only(config)?;
    let inputs = PetInputs::from_catalog(config)?;
    sr_pipeline(runtime, inputs, config, Arc::new(device))
}

/// `(image, label)` batches of the on-disk dataset and twice the split's
/// element count
pub fn oxford_iiit_pet_dataset_d(
    runtime: &PipelineRuntime,
    config: &PipelineConfig,
) -> Result<(DataLoader<DiscriminatorBatch>, usize)> {
    let device = host_only(config)?;
    let inputs = PetInputs::from_catalog(config)?;
    discriminator_pipeline(runtime, inputs, config, Arc::new(device))
}
