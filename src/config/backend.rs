// Backend Configuration - Device selection for training

use anyhow::{Context, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::TrainError;

/// Compute device the training run is placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendDevice {
    /// NVIDIA CUDA GPU (requires the `cuda` feature)
    Cuda,

    /// Metal GPU (macOS, requires the `metal` feature)
    Metal,

    /// CPU fallback (slow, works everywhere)
    Cpu,

    /// Auto-detect best available device
    Auto,
}

impl Default for BackendDevice {
    fn default() -> Self {
        Self::Auto
    }
}

impl BackendDevice {
    /// Get short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            BackendDevice::Cuda => "CUDA (GPU)",
            BackendDevice::Metal => "Metal (GPU)",
            BackendDevice::Cpu => "CPU",
            BackendDevice::Auto => "Auto",
        }
    }

    /// Check if this device was compiled in
    pub fn is_available(&self) -> bool {
        match self {
            BackendDevice::Cuda => candle_core::utils::cuda_is_available(),
            BackendDevice::Metal => candle_core::utils::metal_is_available(),
            BackendDevice::Cpu => true,
            BackendDevice::Auto => true,
        }
    }

    /// Get list of available devices on this system
    pub fn available_devices() -> Vec<BackendDevice> {
        [BackendDevice::Cuda, BackendDevice::Metal]
            .into_iter()
            .filter(|d| d.is_available())
            .chain(std::iter::once(BackendDevice::Cpu))
            .collect()
    }

    /// Select best available device automatically
    pub fn auto_select() -> BackendDevice {
        Self::available_devices()
            .into_iter()
            .next()
            .unwrap_or(BackendDevice::Cpu)
    }

    /// Get the effective device (resolve Auto to concrete device)
    pub fn effective(&self) -> BackendDevice {
        match self {
            BackendDevice::Auto => Self::auto_select(),
            device => *device,
        }
    }

    /// Open the candle device, failing if an explicit choice is unavailable
    pub fn open(&self) -> Result<Device> {
        let effective = self.effective();
        if !effective.is_available() {
            return Err(TrainError::DeviceUnavailable(effective.name().to_string()).into());
        }

        let device = match effective {
            BackendDevice::Cuda => Device::new_cuda(0).context("Failed to open CUDA device 0")?,
            BackendDevice::Metal => Device::new_metal(0).context("Failed to open Metal device 0")?,
            BackendDevice::Cpu | BackendDevice::Auto => Device::Cpu,
        };

        tracing::info!(device = effective.name(), "Selected compute device");
        Ok(device)
    }
}

impl FromStr for BackendDevice {
    type Err = TrainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cuda" | "gpu" => Ok(BackendDevice::Cuda),
            "metal" | "mps" => Ok(BackendDevice::Metal),
            "cpu" => Ok(BackendDevice::Cpu),
            "auto" => Ok(BackendDevice::Auto),
            other => Err(TrainError::InvalidConfig(format!(
                "unknown device '{}' (expected cpu, cuda, metal or auto)",
                other
            ))),
        }
    }
}
