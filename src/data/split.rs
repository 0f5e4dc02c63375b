// Train/validation index split

use rand::seq::index;
use rand::Rng;

/// One sample in this many goes to validation
pub const VALIDATION_DIVISOR: usize = 5;

/// Disjoint train/validation index sets covering 0..N exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// Training indices, ascending
    pub train: Vec<usize>,
    /// Validation indices, in sampling order
    pub val: Vec<usize>,
}

impl Split {
    /// Total number of indices covered
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Draw N / 5 validation indices uniformly without replacement; the rest train.
pub fn split_indices<R: Rng + ?Sized>(sample_count: usize, rng: &mut R) -> Split {
    let val_count = sample_count / VALIDATION_DIVISOR;
    let val = index::sample(rng, sample_count, val_count).into_vec();

    let mut in_val = vec![false; sample_count];
    for &i in &val {
        in_val[i] = true;
    }
    let train = (0..sample_count).filter(|&i| !in_val[i]).collect();

    Split { train, val }
}
