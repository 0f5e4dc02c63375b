// Dataset backed by a safetensors file
//
// Expected entries:
// - images: [N, C, H, W], f32 or u8 (u8 is scaled to [0, 1])
// - labels: [N], u8 / u32 / i64

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use std::path::Path;

use super::{Dataset, Sample};
use crate::errors::{dataset_load_error, TrainError};

pub const IMAGES_KEY: &str = "images";
pub const LABELS_KEY: &str = "labels";

#[derive(Debug, Clone)]
pub struct TensorDataset {
    images: Tensor,
    labels: Vec<u32>,
}

impl TensorDataset {
    /// Load images and labels from a safetensors file onto the CPU
    pub fn load(path: &Path) -> Result<Self> {
        let mut tensors = candle_core::safetensors::load(path, &Device::Cpu)
            .map_err(|e| anyhow::anyhow!(dataset_load_error(path, &e.to_string())))?;

        let mut take = |name: &str| {
            tensors.remove(name).ok_or_else(|| TrainError::MissingTensor {
                name: name.to_string(),
                path: path.display().to_string(),
            })
        };
        let images = take(IMAGES_KEY)?;
        let labels = take(LABELS_KEY)?;

        let dataset = Self::from_tensors(images, labels)
            .with_context(|| dataset_load_error(path, "tensor shapes or dtypes are wrong"))?;

        tracing::info!(
            path = %path.display(),
            samples = dataset.len(),
            image_shape = ?dataset.image_shape(),
            "Loaded tensor dataset"
        );
        Ok(dataset)
    }

    /// Build from in-memory tensors with the same layout as the file format
    pub fn from_tensors(images: Tensor, labels: Tensor) -> Result<Self> {
        if images.rank() != 4 {
            bail!("images must be [N, C, H, W], got {:?}", images.dims());
        }
        if labels.rank() != 1 {
            bail!("labels must be [N], got {:?}", labels.dims());
        }
        if images.dim(0)? != labels.dim(0)? {
            bail!(
                "images has {} samples but labels has {}",
                images.dim(0)?,
                labels.dim(0)?
            );
        }

        let images = match images.dtype() {
            DType::U8 => images.to_dtype(DType::F32)?.affine(1.0 / 255.0, 0.0)?,
            _ => images.to_dtype(DType::F32)?,
        };
        // Widen first so negative or oversized labels are caught instead of wrapping
        let labels = labels
            .to_dtype(DType::I64)?
            .to_vec1::<i64>()?
            .into_iter()
            .enumerate()
            .map(|(i, label)| {
                u32::try_from(label)
                    .map_err(|_| anyhow!("label {} at index {} is not a valid class index", label, i))
            })
            .collect::<Result<Vec<u32>>>()?;

        Ok(Self { images, labels })
    }

    /// (C, H, W) of every image
    pub fn image_shape(&self) -> (usize, usize, usize) {
        let dims = self.images.dims();
        (dims[1], dims[2], dims[3])
    }
}

impl Dataset for TensorDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get(&self, index: usize) -> Result<Sample> {
        let label = *self.labels.get(index).ok_or(TrainError::IndexOutOfRange {
            index,
            len: self.labels.len(),
        })?;
        let image = self.images.get(index)?;
        Ok(Sample { image, label })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.safetensors");

        let images = Tensor::zeros((6, 3, 4, 4), DType::U8, &Device::Cpu).unwrap();
        let labels = Tensor::new(&[0i64, 1, 2, 3, 4, 0], &Device::Cpu).unwrap();
        let mut tensors = HashMap::new();
        tensors.insert(IMAGES_KEY.to_string(), images);
        tensors.insert(LABELS_KEY.to_string(), labels);
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let ds = TensorDataset::load(&path).unwrap();
        assert_eq!(ds.len(), 6);
        assert_eq!(ds.image_shape(), (3, 4, 4));

        let sample = ds.get(3).unwrap();
        assert_eq!(sample.label, 3);
        assert_eq!(sample.image.dtype(), DType::F32);
        assert_eq!(sample.image.dims(), &[3, 4, 4]);
    }

    #[test]
    fn test_negative_label_rejected() {
        let images = Tensor::zeros((3, 1, 4, 4), DType::F32, &Device::Cpu).unwrap();
        let labels = Tensor::new(&[0i64, -1, 2], &Device::Cpu).unwrap();

        let err = TensorDataset::from_tensors(images, labels).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("label -1 at index 1"), "{}", message);
    }

    #[test]
    fn test_missing_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.safetensors");

        let mut tensors = HashMap::new();
        tensors.insert(
            IMAGES_KEY.to_string(),
            Tensor::zeros((2, 1, 4, 4), DType::F32, &Device::Cpu).unwrap(),
        );
        candle_core::safetensors::save(&tensors, &path).unwrap();

        let err = TensorDataset::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::MissingTensor { .. })
        ));
    }

    #[test]
    fn test_mismatched_counts_rejected() {
        let images = Tensor::zeros((3, 1, 4, 4), DType::F32, &Device::Cpu).unwrap();
        let labels = Tensor::new(&[0u32, 1], &Device::Cpu).unwrap();
        assert!(TensorDataset::from_tensors(images, labels).is_err());
    }

    #[test]
    fn test_index_out_of_range() {
        let images = Tensor::zeros((2, 1, 4, 4), DType::F32, &Device::Cpu).unwrap();
        let labels = Tensor::new(&[0u32, 1], &Device::Cpu).unwrap();
        let ds = TensorDataset::from_tensors(images, labels).unwrap();
        assert!(ds.get(2).is_err());
    }
}
