//! Device placement stage
//!
//! The last pipeline stage hands every host batch to a [`DeviceTransfer`]
//! on its own task, so the transfer of batch N overlaps the production of
//! batch N+1.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::batch::Batch;
use crate::error::{PipelineError, Result};

/// Placement target of the final stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Host memory
    #[default]
    Cpu,
    /// Accelerator by ordinal, e.g. `gpu:0`
    Gpu(u32),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Gpu(ordinal) => write!(f, "gpu:{}", ordinal),
        }
    }
}

impl FromStr for Device {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_start_matches('/').to_ascii_lowercase();
        if s == "cpu" || s.starts_with("cpu:") {
            return Ok(Device::Cpu);
        }
        if let Some(ordinal) = s.strip_prefix("gpu:") {
            let ordinal = ordinal.parse().map_err(|_| PipelineError::InvalidConfig {
                reason: format!("invalid device ordinal in '{}'", s),
            })?;
            return Ok(Device::Gpu(ordinal));
        }
        Err(PipelineError::InvalidConfig {
            reason: format!("unknown device '{}'", s),
        })
    }
}

/// Moves a host batch to wherever the consumer reads it from
pub trait DeviceTransfer<B: Batch>: Send + Sync + 'static {
    /// Device this transfer targets
    fn device(&self) -> Device;

    /// Place `batch` on the device
    fn transfer(&self, batch: B) -> Result<B>;
}

/// Keeps batches in host memory
#[derive(Debug, Default, Clone, Copy)]
pub struct HostDevice;

impl<B: Batch> DeviceTransfer<B> for HostDevice {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn transfer(&self, batch: B) -> Result<B> {
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("/gpu:0".parse::<Device>().unwrap(), Device::Gpu(0));
        assert_eq!("GPU:3".parse::<Device>().unwrap(), Device::Gpu(3));
        assert!("gpu:x".parse::<Device>().is_err());
        assert!("tpu:0".parse::<Device>().is_err());
    }

    #[test]
    fn test_device_display() {
        assert_eq!(Device::Gpu(1).to_string(), "gpu:1");
        assert_eq!(Device::default().to_string(), "cpu");
    }
}
