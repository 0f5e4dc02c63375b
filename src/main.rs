// Expert - image classifier training
// Main entry point

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use expert::config::{load_config, BackendDevice, TrainConfig};
use expert::data::{Dataset, SyntheticDataset, TensorDataset};
use expert::errors::UserFriendlyError;
use expert::models::{load_model_metadata, ExpertModel, Saveable};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "expert")]
#[command(about = "Train the expert image classifier", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Train with a train/val split, saving the best validation-loss weights
    Train(TrainArgs),
    /// Show what a saved checkpoint contains
    Info {
        /// Checkpoint weights file
        #[arg(default_value = "expert_state_dict")]
        checkpoint: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct TrainArgs {
    /// TOML config file (default: ./expert.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Safetensors dataset with `images` and `labels`
    #[arg(long, conflicts_with = "synthetic")]
    data: Option<PathBuf>,

    /// Use N generated samples instead of a dataset file
    #[arg(long, value_name = "N")]
    synthetic: Option<usize>,

    /// Side length of synthetic images
    #[arg(long, default_value_t = 32)]
    image_size: usize,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    num_workers: Option<usize>,

    #[arg(long, value_enum)]
    device: Option<BackendDevice>,

    #[arg(long)]
    seed: Option<u64>,

    /// Where to write the best weights
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Log scalars to a time-stamped directory under --results-dir
    #[arg(long)]
    tb: bool,

    #[arg(long)]
    results_dir: Option<PathBuf>,
}

impl TrainArgs {
    /// CLI flags win over the config file
    fn apply(&self, config: &mut TrainConfig) {
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(num_workers) = self.num_workers {
            config.num_workers = num_workers;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(checkpoint) = &self.checkpoint {
            config.checkpoint_path = checkpoint.clone();
        }
        if let Some(results_dir) = &self.results_dir {
            config.results_dir = results_dir.clone();
        }
    }

    fn dataset(&self, config: &TrainConfig) -> Result<Box<dyn Dataset>> {
        match (&self.data, self.synthetic) {
            (Some(path), _) => Ok(Box::new(TensorDataset::load(path)?)),
            (None, Some(len)) => Ok(Box::new(SyntheticDataset::new(
                len,
                config.model.in_channels,
                self.image_size,
                self.image_size,
                config.model.num_classes,
                config.seed.unwrap_or(0),
            ))),
            (None, None) => bail!("No dataset given. Pass --data <file.safetensors> or --synthetic <N>"),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Command::Train(train_args) => run_train(train_args),
        Command::Info { checkpoint } => run_info(&checkpoint),
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let mut config =
        load_config(args.config.as_deref()).user_context("Could not load training config")?;
    args.apply(&mut config);

    let dataset = args.dataset(&config).user_context("Could not open the dataset")?;
    let report = expert::train(dataset.as_ref(), &config, args.tb).user_context_with_suggestion(
        "Training aborted",
        "re-run with EXPERT_DEBUG=1 for detailed logs",
    )?;

    tracing::info!(
        best_val_loss = ?report.best_val_loss,
        checkpoint_writes = report.checkpoint_writes,
        checkpoint = %config.checkpoint_path.display(),
        "Training finished"
    );
    Ok(())
}

fn run_info(checkpoint: &std::path::Path) -> Result<()> {
    let metadata = load_model_metadata(checkpoint)?;
    let model = ExpertModel::load(checkpoint)?;

    println!("Checkpoint: {}", checkpoint.display());
    println!("  Model:      {} (format v{})", metadata.model_type, metadata.format_version);
    println!("  Saved:      {}", metadata.timestamp);
    println!("  Epoch:      {}", metadata.epoch);
    if let Some(loss) = metadata.val_loss {
        println!("  Val loss:   {:.4}", loss);
    }
    println!(
        "  Shape:      {} channels -> {} classes (base {})",
        metadata.config.in_channels, metadata.config.num_classes, metadata.config.base_channels
    );
    println!("  Parameters: {}", model.num_parameters());
    Ok(())
}

fn init_tracing() {
    // Check if debug logging should be enabled
    let show_debug = std::env::var("EXPERT_DEBUG")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false);
    let default_level = if show_debug { "debug" } else { "info" };

    // Default level unless RUST_LOG overrides it
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries the training progress, logs go to stderr
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    // Bridge log crate → tracing (for dependencies using log crate)
    tracing_log::LogTracer::init().ok();
}
