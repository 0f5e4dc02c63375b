// Integration test: full training runs on synthetic data
// Checks split sizes, metric ranges and best-checkpoint behaviour

use anyhow::Result;
use expert::config::{BackendDevice, ModelConfig, TrainConfig};
use expert::data::SyntheticDataset;
use expert::models::{load_model_metadata, model_exists, ExpertModel, Saveable};
use expert::training::{read_scalars, tboard::SCALARS_FILE};
use tempfile::TempDir;

fn small_config(dir: &TempDir, batch_size: usize, epochs: usize) -> TrainConfig {
    TrainConfig {
        batch_size,
        num_workers: 0,
        epochs,
        device: BackendDevice::Cpu,
        seed: Some(7),
        checkpoint_path: dir.path().join("expert_state_dict"),
        results_dir: dir.path().join("results"),
        model: ModelConfig::small(),
        ..TrainConfig::default()
    }
}

#[test]
fn test_ten_samples_one_epoch() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = SyntheticDataset::new(10, 3, 8, 8, 5, 0);
    let config = small_config(&dir, 2, 1);

    let report = expert::train(&dataset, &config, false)?;

    assert_eq!(report.train_samples, 8);
    assert_eq!(report.val_samples, 2);
    assert_eq!(report.train_samples + report.val_samples, 10);
    assert_eq!(report.epochs.len(), 1);

    let epoch = &report.epochs[0];
    assert_eq!(epoch.train.samples_seen, 8);
    assert_eq!(epoch.val.samples_seen, 2);

    // First finite validation loss always beats the empty history
    assert!(report.checkpoint_writes <= 1);
    assert_eq!(report.checkpoint_writes, 1);
    assert!(model_exists(&config.checkpoint_path));
    Ok(())
}

#[test]
fn test_metrics_in_range_after_epoch() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = SyntheticDataset::new(40, 3, 8, 8, 5, 3);
    let report = expert::train(&dataset, &small_config(&dir, 4, 1), false)?;

    for summary in [&report.epochs[0].train, &report.epochs[0].val] {
        assert!(summary.loss >= 0.0 && summary.loss.is_finite(), "{:?}", summary);
        assert!((0.0..=1.0).contains(&summary.accuracy), "{:?}", summary);
    }
    Ok(())
}

#[test]
fn test_checkpoint_written_iff_strict_improvement() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = SyntheticDataset::new(30, 3, 8, 8, 5, 1);
    let report = expert::train(&dataset, &small_config(&dir, 3, 4), false)?;

    let mut best = f64::INFINITY;
    let mut expected_writes = 0;
    for epoch in &report.epochs {
        let improved = epoch.val.loss < best;
        assert_eq!(epoch.checkpoint_saved, improved, "epoch {}", epoch.epoch);
        if improved {
            best = epoch.val.loss;
            expected_writes += 1;
        }
    }
    assert_eq!(report.checkpoint_writes, expected_writes);
    assert_eq!(report.best_val_loss, Some(best));

    // Sidecar records the epoch of the last improvement
    let last_saved = report
        .epochs
        .iter()
        .filter(|e| e.checkpoint_saved)
        .last()
        .map(|e| e.epoch);
    let metadata = load_model_metadata(dir.path().join("expert_state_dict").as_path())?;
    assert_eq!(Some(metadata.epoch), last_saved);
    Ok(())
}

#[test]
fn test_drop_last_in_both_phases() -> Result<()> {
    let dir = TempDir::new()?;
    // 23 samples: 4 val, 19 train; batch 3 -> 18 train and 3 val samples used
    let dataset = SyntheticDataset::new(23, 3, 8, 8, 5, 0);
    let report = expert::train(&dataset, &small_config(&dir, 3, 1), false)?;

    assert_eq!(report.train_samples, 19);
    assert_eq!(report.val_samples, 4);
    assert_eq!(report.epochs[0].train.samples_seen, 18);
    assert_eq!(report.epochs[0].val.samples_seen, 3);
    Ok(())
}

#[test]
fn test_workers_do_not_change_split() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = SyntheticDataset::new(20, 3, 8, 8, 5, 0);

    let mut config = small_config(&dir, 4, 1);
    config.num_workers = 3;
    let threaded = expert::train(&dataset, &config, false)?;

    assert_eq!(threaded.train_samples, 16);
    assert_eq!(threaded.val_samples, 4);
    assert_eq!(threaded.epochs[0].train.samples_seen, 16);
    Ok(())
}

#[test]
fn test_scalar_logging() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = SyntheticDataset::new(10, 3, 8, 8, 5, 0);
    let config = small_config(&dir, 2, 2);

    let report = expert::train(&dataset, &config, true)?;

    let run_dir = report.run_dir.expect("run dir when logging is enabled");
    assert!(run_dir.starts_with(&config.results_dir));

    let events = read_scalars(&run_dir.join(SCALARS_FILE))?;
    let lr_events = events.iter().filter(|e| e.tag == "lr").count();
    assert_eq!(lr_events as u64, report.iterations);
    // (4 train + 1 val batches) x 2 epochs
    assert_eq!(report.iterations, 10);
    assert_eq!(events.iter().filter(|e| e.tag == "val/loss").count(), 2);
    assert!(events
        .iter()
        .filter(|e| e.tag == "lr")
        .all(|e| e.value >= 1e-4 && e.value <= 1e-3));

    // beta1 is cycled alongside the rate
    let momentum: Vec<f64> = events.iter().filter(|e| e.tag == "momentum").map(|e| e.value).collect();
    assert_eq!(momentum.len() as u64, report.iterations);
    assert!(momentum.iter().all(|&b| (0.8..=0.9).contains(&b)));
    assert!(momentum[0] < 0.9);
    Ok(())
}

#[test]
fn test_best_checkpoint_reloads() -> Result<()> {
    let dir = TempDir::new()?;
    let dataset = SyntheticDataset::new(15, 3, 8, 8, 5, 0);
    let config = small_config(&dir, 3, 1);
    expert::train(&dataset, &config, false)?;

    let model = ExpertModel::load(&config.checkpoint_path)?;
    assert_eq!(model.config(), &config.model);
    Ok(())
}
