//! Pipeline configuration
//!
//! Defaults mirror the training setup: 224x224x3 crops, 4x downsampling,
//! batches of 32. Values can be overridden from a JSON file or from
//! `PETSR_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::data::dataset::Split;
use crate::data::device::Device;
use crate::error::{PipelineError, Result};
use crate::{DEFAULT_BATCH_SIZE, DEFAULT_DEVICE_BUFFER_SIZE, DEFAULT_DOWNSAMPLING_FACTOR};

/// Target image size `(height, width, channels)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl ImageSize {
    pub const fn new(height: u32, width: u32, channels: u32) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::new(224, 224, 3)
    }
}

impl FromStr for ImageSize {
    type Err = PipelineError;

    /// Accepts `HxW` or `HxWxC`
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PipelineError::InvalidConfig {
            reason: format!("invalid image size '{}', expected HxW or HxWxC", s),
        };
        let dims = s
            .trim()
            .split(|c| c == 'x' || c == 'X' || c == ',')
            .map(|d| d.trim().parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>>>()?;
        match dims.as_slice() {
            [h, w] => Ok(Self::new(*h, *w, 3)),
            [h, w, c] => Ok(Self::new(*h, *w, *c)),
            _ => Err(invalid()),
        }
    }
}

/// Configuration for building a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the extracted Oxford-IIIT Pet dataset
    pub data_dir: PathBuf,
    /// Which split to stream
    pub split: Split,
    /// High-resolution output size
    pub size: ImageSize,
    /// LR side = HR side / factor
    pub downsampling_factor: u32,
    /// Elements per batch
    pub batch_size: usize,
    /// Host prefetch buffer in batches; `None` uses the pipeline default
    pub prefetch: Option<usize>,
    /// Batches buffered after the device stage
    pub device_buffer: usize,
    /// Placement target
    pub device: Device,
    /// Concurrent element transforms, 0 = one per CPU
    pub num_parallel_calls: usize,
    /// Cycle the split indefinitely
    pub repeat: bool,
    /// Reshuffle record order every epoch
    pub shuffle: bool,
    /// Seed for augmentation, shuffling and interleaving
    pub seed: Option<u64>,
    /// Fail if the split does not match its published size
    pub strict_counts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/oxford_iiit_pet"),
            split: Split::Train,
            size: ImageSize::default(),
            downsampling_factor: DEFAULT_DOWNSAMPLING_FACTOR,
            batch_size: DEFAULT_BATCH_SIZE,
            prefetch: None,
            device_buffer: DEFAULT_DEVICE_BUFFER_SIZE,
            device: Device::Cpu,
            num_parallel_calls: 0,
            repeat: true,
            shuffle: false,
            seed: None,
            strict_counts: false,
        }
    }
}

impl PipelineConfig {
    /// Config for a split with every other value at its default
    pub fn for_split(split: Split) -> Self {
        Self {
            split,
            ..Default::default()
        }
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| PipelineError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| PipelineError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply `PETSR_*` environment overrides
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("PETSR_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(split) = lookup("PETSR_SPLIT") {
            self.split = split.parse()?;
        }
        if let Some(size) = lookup("PETSR_IMAGE_SIZE") {
            self.size = size.parse()?;
        }
        if let Some(v) = lookup("PETSR_DOWNSAMPLING_FACTOR") {
            self.downsampling_factor = parse_var("PETSR_DOWNSAMPLING_FACTOR", &v)?;
        }
        if let Some(v) = lookup("PETSR_BATCH_SIZE") {
            self.batch_size = parse_var("PETSR_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("PETSR_PREFETCH") {
            self.prefetch = Some(parse_var("PETSR_PREFETCH", &v)?);
        }
        if let Some(v) = lookup("PETSR_DEVICE_BUFFER") {
            self.device_buffer = parse_var("PETSR_DEVICE_BUFFER", &v)?;
        }
        if let Some(v) = lookup("PETSR_DEVICE") {
            self.device = v.parse()?;
        }
        if let Some(v) = lookup("PETSR_PARALLEL_CALLS") {
            self.num_parallel_calls = parse_var("PETSR_PARALLEL_CALLS", &v)?;
        }
        if let Some(v) = lookup("PETSR_REPEAT") {
            self.repeat = parse_bool("PETSR_REPEAT", &v)?;
        }
        if let Some(v) = lookup("PETSR_SHUFFLE") {
            self.shuffle = parse_bool("PETSR_SHUFFLE", &v)?;
        }
        if let Some(v) = lookup("PETSR_SEED") {
            self.seed = Some(parse_var("PETSR_SEED", &v)?);
        }
        if let Some(v) = lookup("PETSR_STRICT_COUNTS") {
            self.strict_counts = parse_bool("PETSR_STRICT_COUNTS", &v)?;
        }
        Ok(self)
    }

    /// Check ranges that the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(PipelineError::InvalidConfig { reason }) };

        if self.size.channels != 3 {
            return invalid(format!("only 3-channel images are supported, got {}", self.size.channels));
        }
        if self.size.height == 0 || self.size.width == 0 {
            return invalid(format!("image size {}x{} is empty", self.size.height, self.size.width));
        }
        if self.downsampling_factor == 0 {
            return invalid("downsampling factor must be positive".into());
        }
        if self.size.height < self.downsampling_factor || self.size.width < self.downsampling_factor {
            return invalid(format!(
                "image size {}x{} is smaller than downsampling factor {}",
                self.size.height, self.size.width, self.downsampling_factor
            ));
        }
        if self.batch_size == 0 {
            return invalid("batch size must be positive".into());
        }
        if self.prefetch == Some(0) {
            return invalid("prefetch buffer must hold at least one batch".into());
        }
        if self.device_buffer == 0 {
            return invalid("device buffer must hold at least one batch".into());
        }
        Ok(())
    }

    /// Resolved parallelism for element transforms
    pub fn parallel_calls(&self) -> usize {
        if self.num_parallel_calls == 0 {
            num_cpus::get().max(1)
        } else {
            self.num_parallel_calls
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| PipelineError::InvalidConfig {
        reason: format!("{}: cannot parse '{}'", key, value),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::InvalidConfig {
            reason: format!("{}: cannot parse '{}' as bool", key, value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.size, ImageSize::new(224, 224, 3));
        assert_eq!(config.downsampling_factor, 4);
        assert_eq!(config.batch_size, 32);
        assert!(config.repeat);
        config.validate().unwrap();
    }

    #[test]
    fn test_image_size_parsing() {
        assert_eq!("96x64".parse::<ImageSize>().unwrap(), ImageSize::new(96, 64, 3));
        assert_eq!("32X32x3".parse::<ImageSize>().unwrap(), ImageSize::new(32, 32, 3));
        assert!("32".parse::<ImageSize>().is_err());
        assert!("axb".parse::<ImageSize>().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PETSR_SPLIT", "test"),
            ("PETSR_IMAGE_SIZE", "64x64"),
            ("PETSR_BATCH_SIZE", "8"),
            ("PETSR_DEVICE", "/gpu:0"),
            ("PETSR_REPEAT", "false"),
            ("PETSR_SEED", "17"),
        ]
        .into_iter()
        .collect();

        let config = PipelineConfig::default()
            .with_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.split, Split::Test);
        assert_eq!(config.size, ImageSize::new(64, 64, 3));
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.device, Device::Gpu(0));
        assert!(!config.repeat);
        assert_eq!(config.seed, Some(17));
    }

    #[test]
    fn test_env_rejects_garbage() {
        let err = PipelineConfig::default()
            .with_vars(|k| (k == "PETSR_BATCH_SIZE").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig { .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = PipelineConfig::default();
        config.downsampling_factor = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.size = ImageSize::new(2, 2, 3);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.size.channels = 1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"split": "test", "batch_size": 4, "shuffle": true}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.split, Split::Test);
        assert_eq!(config.batch_size, 4);
        assert!(config.shuffle);
        assert_eq!(config.downsampling_factor, 4);
    }
}
