// Data module - datasets, index splitting and batch loading

pub mod loader;
pub mod split;
pub mod synthetic;
pub mod tensor_file;

use anyhow::Result;
use candle_core::Tensor;

pub use loader::{Batch, Batches, DataLoader};
pub use split::{split_indices, Split, VALIDATION_DIVISOR};
pub use synthetic::SyntheticDataset;
pub use tensor_file::TensorDataset;

/// One labeled image
#[derive(Debug, Clone)]
pub struct Sample {
    /// Image tensor, shape (C, H, W), f32, on the CPU
    pub image: Tensor,
    /// Class index in 0..num_classes
    pub label: u32,
}

/// Integer-indexed collection of labeled images
///
/// `Sync` is required because loader workers read samples concurrently.
pub trait Dataset: Send + Sync {
    /// Number of samples
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch sample `index`; out-of-range indices are an error
    fn get(&self, index: usize) -> Result<Sample>;
}
