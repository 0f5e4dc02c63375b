// Optional scalar logging to a time-stamped run directory
//
// Each scalar is one JSON line in <results_dir>/<run_id>/scalars.jsonl.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::TrainConfig;

pub const SCALARS_FILE: &str = "scalars.jsonl";
pub const CONFIG_FILE: &str = "config.json";

/// One logged value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub step: u64,
    pub value: f64,
    /// Seconds since the Unix epoch
    pub wall_time: f64,
}

/// Appends scalar events for one run
pub struct ScalarLogger {
    run_dir: PathBuf,
    writer: BufWriter<File>,
}

impl ScalarLogger {
    /// Create `results_dir/<timestamp>` and open the scalar file in it
    pub fn create(results_dir: &Path) -> Result<Self> {
        let run_id = Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let run_dir = results_dir.join(run_id);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Failed to create run directory: {:?}", run_dir))?;

        let scalars_path = run_dir.join(SCALARS_FILE);
        let file = File::create(&scalars_path)
            .with_context(|| format!("Failed to create scalar log: {:?}", scalars_path))?;

        tracing::info!(run_dir = %run_dir.display(), "Logging scalars");

        Ok(Self {
            run_dir,
            writer: BufWriter::new(file),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Record the configuration the run was started with
    pub fn write_config(&self, config: &TrainConfig) -> Result<()> {
        let path = self.run_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let event = ScalarEvent {
            tag: tag.to_string(),
            step,
            value,
            wall_time: Utc::now().timestamp_micros() as f64 / 1e6,
        };
        serde_json::to_writer(&mut self.writer, &event).context("Failed to write scalar event")?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush scalar log")
    }
}

/// Read back every event of a scalar file
pub fn read_scalars(path: &Path) -> Result<Vec<ScalarEvent>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("Malformed scalar event"))
        .collect()
}
