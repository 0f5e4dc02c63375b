// Training errors and user-friendly error messages
//
// Typed failures live in `TrainError` so callers can match on them.
// The helpers below turn low-level failures into actionable messages.

use anyhow::{Context, Result};
use std::path::Path;

/// Failures the training loop reports before or while touching tensors
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// A train or validation subset came out empty
    #[error("{phase} subset is empty (dataset has {samples} samples, need at least 5)")]
    EmptySplit { phase: &'static str, samples: usize },

    /// A config value is out of range
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Dataset asked for an index it does not have
    #[error("sample index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Requested device was not compiled in or is not present
    #[error("device '{0}' is not available on this system")]
    DeviceUnavailable(String),

    /// Tensor file lacks a required entry
    #[error("tensor '{name}' missing from {path}")]
    MissingTensor { name: String, path: String },
}

/// Wrap an error with user-friendly context
pub trait UserFriendlyError {
    /// Add user-friendly context to this error
    fn user_context(self, message: &str) -> Self;

    /// Add user-friendly context with a suggestion
    fn user_context_with_suggestion(self, problem: &str, suggestion: &str) -> Self;
}

impl<T> UserFriendlyError for Result<T> {
    fn user_context(self, message: &str) -> Self {
        self.with_context(|| message.to_string())
    }

    fn user_context_with_suggestion(self, problem: &str, suggestion: &str) -> Self {
        self.with_context(|| format!("{}\n\n\x1b[1;33mSuggestion:\x1b[0m {}", problem, suggestion))
    }
}

/// Format a config parse error with helpful suggestions
pub fn config_parse_error(path: &Path, error: &str) -> String {
    format!(
        "Failed to parse config file {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check config file syntax:\n\
           \x1b[36mcat {}\x1b[0m\n\n\
        2. Common mistakes:\n\
           • Missing quotes around strings (device = \"cpu\")\n\
           • Negative or fractional batch_size / epochs\n\
           • Unknown scheduler mode (triangular, triangular2, exp_range)",
        path.display(),
        error,
        path.display()
    )
}

/// Format a checkpoint write error with helpful suggestions
pub fn checkpoint_write_error(path: &Path) -> String {
    format!(
        "Could not write checkpoint to {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • Parent directory does not exist\n\
        • Parent directory not writable\n\
        • Disk full\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check parent directory permissions:\n\
           \x1b[36mls -la $(dirname \"{}\")\x1b[0m\n\n\
        2. Write somewhere else:\n\
           \x1b[36mexpert train --checkpoint /tmp/expert_state_dict\x1b[0m",
        path.display(),
        path.display()
    )
}

/// Format a dataset load error with helpful suggestions
pub fn dataset_load_error(path: &Path, error: &str) -> String {
    format!(
        "Failed to load dataset from {}\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mExpected:\x1b[0m a safetensors file with\n\
           • images: [N, C, H, W] f32 or u8\n\
           • labels: [N] u8, u32 or i64",
        path.display(),
        error
    )
}
