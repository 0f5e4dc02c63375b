// Synthetic dataset for smoke runs and tests
//
// Each sample is generated on demand from (seed, index), so the dataset is
// deterministic and costs no memory. Labels cycle through the classes and
// the image brightness encodes the label, which makes the task learnable.

use anyhow::Result;
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Dataset, Sample};
use crate::errors::TrainError;

#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    len: usize,
    channels: usize,
    height: usize,
    width: usize,
    num_classes: usize,
    seed: u64,
}

impl SyntheticDataset {
    pub fn new(
        len: usize,
        channels: usize,
        height: usize,
        width: usize,
        num_classes: usize,
        seed: u64,
    ) -> Self {
        Self {
            len,
            channels,
            height,
            width,
            num_classes: num_classes.max(1),
            seed,
        }
    }

    /// Label of sample `index`
    pub fn label_of(&self, index: usize) -> u32 {
        (index % self.num_classes) as u32
    }
}

impl Dataset for SyntheticDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Sample> {
        if index >= self.len {
            return Err(TrainError::IndexOutOfRange {
                index,
                len: self.len,
            }
            .into());
        }

        let label = self.label_of(index);
        let level = (label as f32 + 0.5) / self.num_classes as f32;
        let mut rng = StdRng::seed_from_u64(self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));

        let plane = self.height * self.width;
        let mut pixels = Vec::with_capacity(self.channels * plane);
        for c in 0..self.channels {
            let tint = level * (c + 1) as f32 / self.channels as f32;
            pixels.extend((0..plane).map(|_| tint + rng.gen_range(-0.05f32..0.05)));
        }

        let image = Tensor::from_vec(pixels, (self.channels, self.height, self.width), &Device::Cpu)?;
        Ok(Sample { image, label })
    }
}
