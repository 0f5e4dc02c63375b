// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::backend::BackendDevice;
use crate::errors::TrainError;

/// Training run configuration. Immutable once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Samples per batch (both phases)
    pub batch_size: usize,

    /// Threads used to fetch the samples of a batch (0 or 1 = inline)
    pub num_workers: usize,

    /// Number of train+val passes
    pub epochs: usize,

    /// Compute device
    pub device: BackendDevice,

    /// Seed for the split, loader shuffling and weight init (random when unset)
    pub seed: Option<u64>,

    /// Where the best-validation-loss weights are written
    pub checkpoint_path: PathBuf,

    /// Parent of the timestamped scalar-log directories
    pub results_dir: PathBuf,

    /// Print interim train metrics every this many batches
    pub log_every: usize,

    pub model: ModelConfig,

    pub scheduler: SchedulerConfig,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_workers: 0,
            epochs: 10,
            device: BackendDevice::Auto,
            seed: None,
            checkpoint_path: PathBuf::from("expert_state_dict"),
            results_dir: PathBuf::from("results"),
            log_every: 150,
            model: ModelConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl TrainConfig {
    /// Check value ranges the training loop relies on
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.batch_size == 0 {
            return Err(TrainError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.epochs == 0 {
            return Err(TrainError::InvalidConfig("epochs must be > 0".into()));
        }
        if self.log_every == 0 {
            return Err(TrainError::InvalidConfig("log_every must be > 0".into()));
        }
        self.model.validate()?;
        self.scheduler.validate()
    }
}

/// Shape of the expert classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub in_channels: usize,
    pub num_classes: usize,
    /// Channels of the first conv block; doubled per block
    pub base_channels: usize,
    pub dropout: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            in_channels: 3,
            num_classes: 5,
            base_channels: 16,
            dropout: 0.25,
        }
    }
}

impl ModelConfig {
    /// Create small config for fast testing (works well on CPU)
    pub fn small() -> Self {
        Self {
            base_channels: 4,
            dropout: 0.0,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), TrainError> {
        if self.in_channels == 0 || self.num_classes == 0 || self.base_channels == 0 {
            return Err(TrainError::InvalidConfig(
                "model channels and num_classes must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainError::InvalidConfig("dropout must be in [0, 1)".into()));
        }
        Ok(())
    }
}

/// Cyclical learning-rate policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclicMode {
    /// Constant amplitude
    Triangular,
    /// Amplitude halves every cycle
    Triangular2,
    /// Amplitude scaled by gamma^iteration
    ExpRange,
}

/// Cyclical learning-rate bounds and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub base_lr: f64,
    pub max_lr: f64,
    /// Iterations from base_lr up to max_lr
    pub step_size_up: usize,
    /// Iterations back down (defaults to step_size_up)
    pub step_size_down: Option<usize>,
    pub mode: CyclicMode,
    /// Decay for exp_range
    pub gamma: f64,
    /// Cycle Adam's beta1 inversely to the learning rate
    pub cycle_momentum: bool,
    /// beta1 at the learning-rate peak
    pub base_momentum: f64,
    /// beta1 at the learning-rate trough
    pub max_momentum: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_lr: 1e-4,
            max_lr: 1e-3,
            step_size_up: 2000,
            step_size_down: None,
            mode: CyclicMode::Triangular,
            gamma: 1.0,
            cycle_momentum: true,
            base_momentum: 0.8,
            max_momentum: 0.9,
        }
    }
}

impl SchedulerConfig {
    fn validate(&self) -> Result<(), TrainError> {
        if !(self.base_lr > 0.0 && self.base_lr <= self.max_lr) {
            return Err(TrainError::InvalidConfig(
                "scheduler requires 0 < base_lr <= max_lr".into(),
            ));
        }
        if self.step_size_up == 0 || self.step_size_down == Some(0) {
            return Err(TrainError::InvalidConfig(
                "scheduler step sizes must be > 0".into(),
            ));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(TrainError::InvalidConfig("gamma must be in (0, 1]".into()));
        }
        if self.cycle_momentum
            && !(0.0 <= self.base_momentum
                && self.base_momentum <= self.max_momentum
                && self.max_momentum < 1.0)
        {
            return Err(TrainError::InvalidConfig(
                "scheduler requires 0 <= base_momentum <= max_momentum < 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.checkpoint_path, PathBuf::from("expert_state_dict"));
        assert_eq!(config.model.in_channels, 3);
        assert_eq!(config.model.num_classes, 5);
        assert_eq!(config.scheduler.base_lr, 1e-4);
        assert_eq!(config.scheduler.max_lr, 1e-3);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = TrainConfig {
            batch_size: 0,
            ..TrainConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TrainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_inverted_lr_bounds_rejected() {
        let mut config = TrainConfig::default();
        config.scheduler.base_lr = 1e-2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_momentum_bounds_rejected() {
        let mut config = TrainConfig::default();
        config.scheduler.base_momentum = 0.95;
        assert!(config.validate().is_err());

        config.scheduler.cycle_momentum = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dropout_of_one_rejected() {
        let mut config = TrainConfig::default();
        config.model.dropout = 1.0;
        assert!(config.validate().is_err());
    }
}
