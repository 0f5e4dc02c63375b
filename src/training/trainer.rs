// Training orchestrator - split, loaders, epoch loop, best checkpoint
//
// Progress goes to stdout in a fixed format; structured events go through
// tracing.

use anyhow::{Context, Result};
use candle_core::{DType, Device, ModuleT, D};
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

use super::checkpoint::BestCheckpoint;
use super::metrics::{
    format_interim, format_sample_check, format_summary, Phase, PhaseSummary, RunningMetrics,
};
use super::scheduler::{CyclicLr, LrScheduler};
use super::tboard::ScalarLogger;
use crate::config::TrainConfig;
use crate::data::{split_indices, Batch, DataLoader, Dataset, Split};
use crate::errors::TrainError;
use crate::models::ExpertModel;

/// Per-epoch outcome
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    /// 1-based
    pub epoch: usize,
    pub train: PhaseSummary,
    pub val: PhaseSummary,
    pub checkpoint_saved: bool,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub val_samples: usize,
    pub epochs: Vec<EpochReport>,
    pub best_val_loss: Option<f64>,
    pub checkpoint_writes: usize,
    pub iterations: u64,
    pub elapsed_secs: f64,
    /// Scalar-log directory when logging was enabled
    pub run_dir: Option<PathBuf>,
}

/// Train an expert model on `dataset`, checkpointing the best validation loss
pub fn train<S: Dataset + ?Sized>(dataset: &S, config: &TrainConfig, use_tb: bool) -> Result<TrainingReport> {
    Trainer::new(dataset, config, use_tb)?.run()
}

/// Seeded when the config has a seed, otherwise from OS entropy
fn run_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Owns everything one run mutates
pub struct Trainer<'a, S: Dataset + ?Sized> {
    config: &'a TrainConfig,
    device: Device,
    split: Split,
    train_loader: DataLoader<'a, S>,
    val_loader: DataLoader<'a, S>,
    model: ExpertModel,
    optimizer: AdamW,
    scheduler: CyclicLr,
    checkpoint: BestCheckpoint,
    logger: Option<ScalarLogger>,
    iterations: u64,
}

impl<'a, S: Dataset + ?Sized> Trainer<'a, S> {
    pub fn new(dataset: &'a S, config: &'a TrainConfig, use_tb: bool) -> Result<Self> {
        config.validate()?;

        let logger = if use_tb {
            let logger = ScalarLogger::create(&config.results_dir)?;
            logger.write_config(config)?;
            Some(logger)
        } else {
            None
        };

        let sample_count = dataset.len();
        let mut rng = run_rng(config.seed);
        let split = split_indices(sample_count, &mut rng);

        println!("Training samples: {}", split.train.len());
        println!("Validation samples: {}", split.val.len());
        println!("{}", format_sample_check(sample_count, split.len()));

        if split.train.is_empty() {
            return Err(TrainError::EmptySplit {
                phase: Phase::Train.name(),
                samples: sample_count,
            }
            .into());
        }
        if split.val.is_empty() {
            return Err(TrainError::EmptySplit {
                phase: Phase::Val.name(),
                samples: sample_count,
            }
            .into());
        }

        tracing::info!(
            samples = sample_count,
            train = split.train.len(),
            val = split.val.len(),
            batch_size = config.batch_size,
            num_workers = config.num_workers,
            "Split dataset"
        );

        let train_loader = DataLoader::new(
            dataset,
            split.train.clone(),
            config.batch_size,
            config.num_workers,
            StdRng::seed_from_u64(rng.gen()),
        );
        let val_loader = DataLoader::new(
            dataset,
            split.val.clone(),
            config.batch_size,
            config.num_workers,
            StdRng::seed_from_u64(rng.gen()),
        );

        let device = config.device.open()?;
        if let Some(seed) = config.seed {
            if let Err(err) = device.set_seed(seed) {
                tracing::debug!(error = %err, "Device RNG not seeded");
            }
        }

        let model = ExpertModel::new(&config.model, &device).context("Failed to build expert model")?;
        let scheduler = CyclicLr::new(&config.scheduler);
        // Adam: AdamW without weight decay
        let optimizer = AdamW::new(
            model.varmap().all_vars(),
            ParamsAdamW {
                lr: scheduler.learning_rate(),
                beta1: scheduler.momentum().unwrap_or(0.9),
                beta2: 0.999,
                eps: 1e-8,
                weight_decay: 0.0,
            },
        )?;

        tracing::info!(
            parameters = model.num_parameters(),
            base_lr = config.scheduler.base_lr,
            max_lr = config.scheduler.max_lr,
            "Model ready"
        );

        Ok(Self {
            config,
            device,
            split,
            train_loader,
            val_loader,
            model,
            optimizer,
            scheduler,
            checkpoint: BestCheckpoint::new(&config.checkpoint_path),
            logger,
            iterations: 0,
        })
    }

    /// Run every epoch and return the report
    pub fn run(mut self) -> Result<TrainingReport> {
        let start = Instant::now();
        let mut epochs = Vec::with_capacity(self.config.epochs);

        for epoch in 1..=self.config.epochs {
            let epoch_start = Instant::now();
            println!("\nEpoch {}/{}", epoch, self.config.epochs);
            println!("{}", "-".repeat(10));

            let train = self.run_phase(Phase::Train)?;
            let val = self.run_phase(Phase::Val)?;
            let checkpoint_saved = self.checkpoint.observe(&self.model, epoch, val.loss)?;

            if let Some(logger) = self.logger.as_mut() {
                for summary in [&train, &val] {
                    logger.add_scalar(&format!("{}/loss", summary.phase), summary.loss, epoch as u64)?;
                    logger.add_scalar(&format!("{}/acc", summary.phase), summary.accuracy, epoch as u64)?;
                }
                logger.flush()?;
            }

            tracing::info!(
                epoch,
                train_loss = train.loss,
                val_loss = val.loss,
                val_acc = val.accuracy,
                checkpoint_saved,
                secs = epoch_start.elapsed().as_secs_f64(),
                "Epoch complete"
            );

            epochs.push(EpochReport {
                epoch,
                train,
                val,
                checkpoint_saved,
            });
        }

        let elapsed_secs = start.elapsed().as_secs_f64();
        println!("finished in {}", elapsed_secs);

        Ok(TrainingReport {
            train_samples: self.split.train.len(),
            val_samples: self.split.val.len(),
            epochs,
            best_val_loss: self.checkpoint.best_loss(),
            checkpoint_writes: self.checkpoint.writes(),
            iterations: self.iterations,
            elapsed_secs,
            run_dir: self.logger.as_ref().map(|l| l.run_dir().to_path_buf()),
        })
    }

    /// One pass over the phase's subset
    fn run_phase(&mut self, phase: Phase) -> Result<PhaseSummary> {
        println!("Starting {} phase", phase);

        let loader = match phase {
            Phase::Train => &mut self.train_loader,
            Phase::Val => &mut self.val_loader,
        };
        let subset_size = loader.num_samples();
        let num_batches = loader.num_batches();
        let batches = loader.epoch();

        let mut metrics = RunningMetrics::new();
        for (batch_idx, batch) in batches.enumerate() {
            let batch = batch?.to_device(&self.device)?;
            let (mean_loss, correct) = self.step(phase, &batch)?;
            metrics.record(mean_loss, correct, batch.len());

            if phase.is_train() && batch_idx % self.config.log_every == 0 {
                println!("{}", format_interim(batch_idx, num_batches, &metrics));
            }

            // Stepped every batch, validation included
            self.iterations += 1;
            let lr = self.scheduler.step();
            self.optimizer.set_learning_rate(lr);
            let beta1 = self.scheduler.momentum();
            if let Some(beta1) = beta1 {
                let mut params = self.optimizer.params().clone();
                params.beta1 = beta1;
                self.optimizer.set_params(params);
            }
            tracing::debug!(iteration = self.iterations, lr, ?beta1, "Learning rate");
            if let Some(logger) = self.logger.as_mut() {
                logger.add_scalar("lr", lr, self.iterations)?;
                if let Some(beta1) = beta1 {
                    logger.add_scalar("momentum", beta1, self.iterations)?;
                }
            }
        }

        let summary = metrics.summarize(phase, subset_size);
        println!("{}", format_summary(&summary));
        Ok(summary)
    }

    /// Forward (and, when training, backward + update) one batch.
    /// Returns the batch's mean loss and number of correct predictions.
    fn step(&mut self, phase: Phase, batch: &Batch) -> Result<(f64, usize)> {
        let train = phase.is_train();
        let logits = self.model.forward_t(&batch.images, train)?;
        let logits = if train { logits } else { logits.detach() };

        let loss = loss::cross_entropy(&logits, &batch.labels)?;
        let predicted = logits.argmax(D::Minus1)?;

        if train {
            self.optimizer.backward_step(&loss)?;
        }

        let correct = predicted
            .eq(&batch.labels)?
            .to_dtype(DType::U32)?
            .sum_all()?
            .to_scalar::<u32>()? as usize;
        let mean_loss = loss.to_scalar::<f32>()? as f64;

        Ok((mean_loss, correct))
    }

    pub fn split(&self) -> &Split {
        &self.split
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendDevice, ModelConfig};
    use crate::data::SyntheticDataset;
    use tempfile::TempDir;

    fn config(dir: &TempDir, epochs: usize) -> TrainConfig {
        TrainConfig {
            batch_size: 2,
            epochs,
            device: BackendDevice::Cpu,
            seed: Some(1),
            checkpoint_path: dir.path().join("expert_state_dict"),
            results_dir: dir.path().join("results"),
            model: ModelConfig::small(),
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_too_small_dataset_rejected() {
        let dir = TempDir::new().unwrap();
        let ds = SyntheticDataset::new(4, 3, 8, 8, 5, 0);
        let err = train(&ds, &config(&dir, 1), false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrainError>(),
            Some(TrainError::EmptySplit { phase: "val", samples: 4 })
        ));
    }

    #[test]
    fn test_invalid_config_rejected_before_split() {
        let dir = TempDir::new().unwrap();
        let ds = SyntheticDataset::new(10, 3, 8, 8, 5, 0);
        let mut cfg = config(&dir, 1);
        cfg.epochs = 0;
        assert!(train(&ds, &cfg, false).is_err());
    }

    #[test]
    fn test_scheduler_steps_every_batch_of_both_phases() {
        let dir = TempDir::new().unwrap();
        // 20 samples: 16 train (8 batches), 4 val (2 batches)
        let ds = SyntheticDataset::new(20, 3, 8, 8, 5, 0);
        let report = train(&ds, &config(&dir, 2), false).unwrap();
        assert_eq!(report.iterations, 2 * (8 + 2));
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let ds = SyntheticDataset::new(25, 3, 8, 8, 5, 0);
        let cfg = config(&dir, 1);
        let a = Trainer::new(&ds, &cfg, false).unwrap();
        let b = Trainer::new(&ds, &cfg, false).unwrap();
        assert_eq!(a.split(), b.split());
    }
}
