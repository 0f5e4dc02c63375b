// Batch loader over a subset of dataset indices
//
// Every pass reshuffles the subset with the loader's own RNG and drops a
// trailing incomplete batch.

use anyhow::{anyhow, Context, Result};
use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::{Dataset, Sample};

/// Stacked images and labels for one step
#[derive(Debug)]
pub struct Batch {
    /// Shape (B, C, H, W), f32
    pub images: Tensor,
    /// Shape (B,), u32
    pub labels: Tensor,
}

impl Batch {
    /// Number of samples in the batch
    pub fn len(&self) -> usize {
        self.labels.dims().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move both tensors to `device`
    pub fn to_device(self, device: &Device) -> Result<Self> {
        Ok(Self {
            images: self.images.to_device(device)?,
            labels: self.labels.to_device(device)?,
        })
    }
}

/// Loader for one subset (train or val) of a dataset
pub struct DataLoader<'a, D: Dataset + ?Sized> {
    dataset: &'a D,
    indices: Vec<usize>,
    batch_size: usize,
    num_workers: usize,
    rng: StdRng,
}

impl<'a, D: Dataset + ?Sized> DataLoader<'a, D> {
    pub fn new(
        dataset: &'a D,
        indices: Vec<usize>,
        batch_size: usize,
        num_workers: usize,
        rng: StdRng,
    ) -> Self {
        Self {
            dataset,
            indices,
            batch_size: batch_size.max(1),
            num_workers,
            rng,
        }
    }

    /// Size of the subset this loader samples from
    pub fn num_samples(&self) -> usize {
        self.indices.len()
    }

    /// Full batches per pass
    pub fn num_batches(&self) -> usize {
        self.indices.len() / self.batch_size
    }

    /// Shuffle and start a new pass over the subset
    pub fn epoch(&mut self) -> Batches<'a, D> {
        let mut order = self.indices.clone();
        order.shuffle(&mut self.rng);
        Batches {
            dataset: self.dataset,
            order,
            batch_size: self.batch_size,
            num_workers: self.num_workers,
            position: 0,
        }
    }
}

/// One shuffled pass; yields only full batches
pub struct Batches<'a, D: Dataset + ?Sized> {
    dataset: &'a D,
    order: Vec<usize>,
    batch_size: usize,
    num_workers: usize,
    position: usize,
}

impl<'a, D: Dataset + ?Sized> Batches<'a, D> {
    /// Indices of the batches still to come, in order
    pub fn remaining_indices(&self) -> impl Iterator<Item = &[usize]> {
        self.order[self.position..].chunks_exact(self.batch_size)
    }
}

impl<'a, D: Dataset + ?Sized> Iterator for Batches<'a, D> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let end = self.position + self.batch_size;
        if end > self.order.len() {
            return None;
        }
        let indices = &self.order[self.position..end];
        self.position = end;
        Some(collate(self.dataset, indices, self.num_workers))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.order.len() - self.position) / self.batch_size;
        (left, Some(left))
    }
}

impl<'a, D: Dataset + ?Sized> ExactSizeIterator for Batches<'a, D> {}

/// Fetch and stack the samples at `indices`
pub fn collate<D: Dataset + ?Sized>(dataset: &D, indices: &[usize], num_workers: usize) -> Result<Batch> {
    let samples = fetch_samples(dataset, indices, num_workers)?;

    let images: Vec<Tensor> = samples.iter().map(|s| s.image.clone()).collect();
    let labels: Vec<u32> = samples.iter().map(|s| s.label).collect();

    let images = Tensor::stack(&images, 0).context("Samples in a batch must share one image shape")?;
    let labels = Tensor::new(labels.as_slice(), &Device::Cpu)?;

    Ok(Batch { images, labels })
}

// Workers each take a contiguous slice so the output keeps sampler order.
fn fetch_samples<D: Dataset + ?Sized>(
    dataset: &D,
    indices: &[usize],
    num_workers: usize,
) -> Result<Vec<Sample>> {
    if num_workers <= 1 || indices.len() <= 1 {
        return indices.iter().map(|&i| dataset.get(i)).collect();
    }

    let chunk = indices.len().div_ceil(num_workers);
    std::thread::scope(|scope| -> Result<Vec<Sample>> {
        let handles: Vec<_> = indices
            .chunks(chunk)
            .map(|part| {
                scope.spawn(move || part.iter().map(|&i| dataset.get(i)).collect::<Result<Vec<_>>>())
            })
            .collect();

        let mut samples = Vec::with_capacity(indices.len());
        for handle in handles {
            let part = handle
                .join()
                .map_err(|_| anyhow!("data loader worker panicked"))??;
            samples.extend(part);
        }
        Ok(samples)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SyntheticDataset;
    use rand::SeedableRng;

    fn dataset(len: usize) -> SyntheticDataset {
        SyntheticDataset::new(len, 3, 4, 4, 5, 0)
    }

    #[test]
    fn test_drop_last() {
        let ds = dataset(10);
        let mut loader = DataLoader::new(&ds, (0..7).collect(), 2, 0, StdRng::seed_from_u64(0));
        assert_eq!(loader.num_samples(), 7);
        assert_eq!(loader.num_batches(), 3);

        let batches: Vec<Batch> = loader.epoch().collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 3);
        for batch in &batches {
            assert_eq!(batch.len(), 2);
            assert_eq!(batch.images.dims(), &[2, 3, 4, 4]);
        }
    }

    #[test]
    fn test_subset_smaller_than_batch_yields_nothing() {
        let ds = dataset(10);
        let mut loader = DataLoader::new(&ds, vec![3], 2, 0, StdRng::seed_from_u64(0));
        assert_eq!(loader.num_batches(), 0);
        assert_eq!(loader.epoch().count(), 0);
    }

    #[test]
    fn test_only_subset_indices_visited() {
        let ds = dataset(20);
        let subset = vec![1, 4, 9, 13, 17, 19];
        let mut loader = DataLoader::new(&ds, subset.clone(), 3, 0, StdRng::seed_from_u64(5));

        let pass = loader.epoch();
        let mut seen: Vec<usize> = pass.remaining_indices().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, subset);
    }

    #[test]
    fn test_reshuffles_each_pass() {
        let ds = dataset(200);
        let mut loader = DataLoader::new(&ds, (0..200).collect(), 10, 0, StdRng::seed_from_u64(3));
        let first: Vec<usize> = loader.epoch().remaining_indices().flatten().copied().collect();
        let second: Vec<usize> = loader.epoch().remaining_indices().flatten().copied().collect();
        assert_ne!(first, second);
    }

    #[test]
    fn test_workers_preserve_order() {
        let ds = dataset(32);
        let indices: Vec<usize> = (0..16).rev().collect();

        let inline = collate(&ds, &indices, 0).unwrap();
        let threaded = collate(&ds, &indices, 3).unwrap();

        assert_eq!(
            inline.labels.to_vec1::<u32>().unwrap(),
            threaded.labels.to_vec1::<u32>().unwrap()
        );
        let diff = (inline.images - threaded.images)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn test_bad_index_propagates() {
        let ds = dataset(4);
        assert!(collate(&ds, &[0, 9], 2).is_err());
    }
}
