// Model persistence utilities
// Handles saving/loading weights + configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ModelConfig;
use crate::errors::checkpoint_write_error;

/// Current sidecar format
pub const FORMAT_VERSION: u32 = 1;

/// Model persistence
pub trait Saveable {
    fn save(&self, path: &Path) -> Result<()>;
    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;
}

/// Metadata saved alongside model weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model configuration
    pub config: ModelConfig,
    /// Model type identifier
    pub model_type: String,
    /// Epoch (1-based) the weights come from, 0 if saved outside training
    pub epoch: usize,
    /// Validation loss that triggered the save
    pub val_loss: Option<f64>,
    /// Timestamp of save
    pub timestamp: String,
    /// Version of the persistence format
    pub format_version: u32,
}

impl ModelMetadata {
    pub fn new(config: ModelConfig, model_type: &str, epoch: usize, val_loss: Option<f64>) -> Self {
        Self {
            config,
            model_type: model_type.to_string(),
            epoch,
            val_loss,
            timestamp: chrono::Utc::now().to_rfc3339(),
            format_version: FORMAT_VERSION,
        }
    }
}

/// Sidecar path for a weights file: `{path}.json`, keeping any existing extension
pub fn metadata_path(weights_path: &Path) -> PathBuf {
    let mut path = weights_path.as_os_str().to_os_string();
    path.push(".json");
    PathBuf::from(path)
}

/// Save model with metadata
///
/// Creates two files:
/// - {path} - Model weights (Candle's VarMap safetensors format)
/// - {path}.json - Model metadata (config, epoch, loss)
///
/// Both are overwritten in place.
pub fn save_model_with_metadata(
    weights_path: &Path,
    varmap: &candle_nn::VarMap,
    metadata: &ModelMetadata,
) -> Result<()> {
    varmap
        .save(weights_path)
        .with_context(|| checkpoint_write_error(weights_path))?;

    let metadata_path = metadata_path(weights_path);
    let metadata_json = serde_json::to_string_pretty(metadata)
        .context("Failed to serialize model metadata")?;
    fs::write(&metadata_path, metadata_json)
        .with_context(|| checkpoint_write_error(&metadata_path))?;

    tracing::info!(
        path = %weights_path.display(),
        epoch = metadata.epoch,
        val_loss = ?metadata.val_loss,
        "Saved {} weights",
        metadata.model_type
    );

    Ok(())
}

/// Load model metadata
pub fn load_model_metadata(weights_path: &Path) -> Result<ModelMetadata> {
    let metadata_path = metadata_path(weights_path);

    if !metadata_path.exists() {
        anyhow::bail!(
            "Model metadata not found at {:?}. Weights cannot be loaded without the model shape.",
            metadata_path
        );
    }

    let metadata_json = fs::read_to_string(&metadata_path)
        .with_context(|| format!("Failed to read metadata from {:?}", metadata_path))?;

    let metadata: ModelMetadata = serde_json::from_str(&metadata_json)
        .context("Failed to parse model metadata JSON")?;

    if metadata.format_version > FORMAT_VERSION {
        anyhow::bail!(
            "Model metadata format {} is newer than supported format {}",
            metadata.format_version,
            FORMAT_VERSION
        );
    }

    Ok(metadata)
}

/// Check if a saved model exists
pub fn model_exists(weights_path: &Path) -> bool {
    weights_path.exists() && metadata_path(weights_path).exists()
}
