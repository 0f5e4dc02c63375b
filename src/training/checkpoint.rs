// Best-validation-loss checkpointing
//
// One fixed file, overwritten on every improvement. No versioning, no
// atomic rename.

use anyhow::Result;
use std::path::PathBuf;

use crate::models::ExpertModel;

/// Lowest validation loss seen in a run
#[derive(Debug, Clone, Copy)]
pub struct BestLoss {
    best: f64,
}

impl Default for BestLoss {
    fn default() -> Self {
        Self { best: f64::INFINITY }
    }
}

impl BestLoss {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `loss`; true iff it is strictly below every previous one
    ///
    /// NaN never improves.
    pub fn improve(&mut self, loss: f64) -> bool {
        if loss < self.best {
            self.best = loss;
            true
        } else {
            false
        }
    }

    /// None until something improved
    pub fn get(&self) -> Option<f64> {
        self.best.is_finite().then_some(self.best)
    }
}

/// Writes the model whenever validation loss improves
pub struct BestCheckpoint {
    path: PathBuf,
    best: BestLoss,
    writes: usize,
}

impl BestCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            best: BestLoss::new(),
            writes: 0,
        }
    }

    /// Save `model` if `val_loss` is a new best. Returns whether it saved.
    pub fn observe(&mut self, model: &ExpertModel, epoch: usize, val_loss: f64) -> Result<bool> {
        if !self.best.improve(val_loss) {
            tracing::debug!(epoch, val_loss, best = ?self.best.get(), "No improvement");
            return Ok(false);
        }

        println!("New best loss! Saving model...");
        model.save_checkpoint(&self.path, epoch, val_loss)?;
        self.writes += 1;
        Ok(true)
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best.get()
    }

    /// Number of times the checkpoint file was written
    pub fn writes(&self) -> usize {
        self.writes
    }
}
