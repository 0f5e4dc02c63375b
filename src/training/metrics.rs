// Running loss/accuracy accounting for one phase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Train or validation pass within an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Train,
    Val,
}

impl Phase {
    /// Order the phases run in every epoch
    pub const ALL: [Phase; 2] = [Phase::Train, Phase::Val];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Val => "val",
        }
    }

    /// Capitalized name for summary lines
    pub fn title(&self) -> &'static str {
        match self {
            Phase::Train => "Train",
            Phase::Val => "Val",
        }
    }

    pub fn is_train(&self) -> bool {
        matches!(self, Phase::Train)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sums accumulated over the batches of a phase
#[derive(Debug, Clone, Default)]
pub struct RunningMetrics {
    loss_sum: f64,
    correct: usize,
    seen: usize,
}

impl RunningMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one batch: its mean loss, correct predictions and size
    pub fn record(&mut self, mean_loss: f64, correct: usize, batch_len: usize) {
        self.loss_sum += mean_loss * batch_len as f64;
        self.correct += correct;
        self.seen += batch_len;
    }

    /// Samples recorded so far
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Loss averaged over the samples seen so far
    pub fn interim_loss(&self) -> f64 {
        ratio(self.loss_sum, self.seen)
    }

    /// Accuracy over the samples seen so far
    pub fn interim_accuracy(&self) -> f64 {
        ratio(self.correct as f64, self.seen)
    }

    /// Close the phase, averaging over the full subset size
    ///
    /// Batches dropped by the loader still count in the denominator.
    pub fn summarize(&self, phase: Phase, subset_size: usize) -> PhaseSummary {
        PhaseSummary {
            phase,
            loss: ratio(self.loss_sum, subset_size),
            accuracy: ratio(self.correct as f64, subset_size),
            samples_seen: self.seen,
        }
    }
}

fn ratio(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Epoch-level result for one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub loss: f64,
    pub accuracy: f64,
    pub samples_seen: usize,
}

/// `[batch/batches] loss: x.xxx\t acc: x.xxx`
pub fn format_interim(batch_idx: usize, num_batches: usize, metrics: &RunningMetrics) -> String {
    format!(
        "[{}/{}] loss: {:.3}\t acc: {:.3}",
        batch_idx,
        num_batches,
        metrics.interim_loss(),
        metrics.interim_accuracy()
    )
}

/// `Train: Loss: x.xxx\t Acc: x.xxx`
pub fn format_summary(summary: &PhaseSummary) -> String {
    format!(
        "{}: Loss: {:.3}\t Acc: {:.3}",
        summary.phase.title(),
        summary.loss,
        summary.accuracy
    )
}

/// `Samples: N, True` when the split covers every sample
pub fn format_sample_check(samples: usize, split_total: usize) -> String {
    let covered = if samples == split_total { "True" } else { "False" };
    format!("Samples: {}, {}", samples, covered)
}
