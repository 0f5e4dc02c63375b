// Expert Model - small convolutional image classifier
// (B, C, H, W) images -> (B, num_classes) logits

use anyhow::Result;
use candle_core::{DType, Device, Module, ModuleT, Tensor, D};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Dropout, Linear, VarBuilder, VarMap};
use std::path::Path;

use super::persistence::{load_model_metadata, save_model_with_metadata, ModelMetadata, Saveable};
use crate::config::ModelConfig;

pub const MODEL_TYPE: &str = "expert";

/// Three conv blocks, global average pooling, dropout, linear head
pub struct ExpertModel {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    dropout: Dropout,
    classifier: Linear,
    config: ModelConfig,
    varmap: VarMap,
}

impl ExpertModel {
    /// Create new model with random initialization
    pub fn new(config: &ModelConfig, device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let same = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let c1 = config.base_channels;
        let c2 = c1 * 2;
        let c3 = c2 * 2;

        Ok(Self {
            conv1: conv2d(config.in_channels, c1, 3, same, vb.pp("conv1"))?,
            conv2: conv2d(c1, c2, 3, same, vb.pp("conv2"))?,
            conv3: conv2d(c2, c3, 3, same, vb.pp("conv3"))?,
            dropout: Dropout::new(config.dropout),
            classifier: linear(c3, config.num_classes, vb.pp("classifier"))?,
            config: config.clone(),
            varmap,
        })
    }

    /// Predicted class per image (eval mode)
    pub fn predict(&self, images: &Tensor) -> Result<Tensor> {
        let logits = self.forward_t(images, false)?;
        Ok(logits.argmax(D::Minus1)?)
    }

    /// All trainable variables live here
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Total number of scalar parameters
    pub fn num_parameters(&self) -> usize {
        self.varmap.all_vars().iter().map(|v| v.elem_count()).sum()
    }

    /// Write weights and sidecar metadata for a given epoch / validation loss
    pub fn save_checkpoint(&self, path: &Path, epoch: usize, val_loss: f64) -> Result<()> {
        let metadata = ModelMetadata::new(self.config.clone(), MODEL_TYPE, epoch, Some(val_loss));
        save_model_with_metadata(path, &self.varmap, &metadata)
    }
}

impl ModuleT for ExpertModel {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = self.conv1.forward(xs)?.relu()?.max_pool2d(2)?;
        let xs = self.conv2.forward(&xs)?.relu()?.max_pool2d(2)?;
        let xs = self.conv3.forward(&xs)?.relu()?;
        // Global average pool over H and W
        let xs = xs.mean(3)?.mean(2)?;
        let xs = self.dropout.forward_t(&xs, train)?;
        self.classifier.forward(&xs)
    }
}

impl Saveable for ExpertModel {
    fn save(&self, path: &Path) -> Result<()> {
        let metadata = ModelMetadata::new(self.config.clone(), MODEL_TYPE, 0, None);
        save_model_with_metadata(path, &self.varmap, &metadata)
    }

    /// Rebuild from the sidecar config and load weights onto the CPU
    fn load(path: &Path) -> Result<Self> {
        let metadata = load_model_metadata(path)?;
        let mut model = Self::new(&metadata.config, &Device::Cpu)?;
        model.varmap.load(path)?;
        Ok(model)
    }
}
