// Training module - epoch loop, LR schedule, metrics and checkpoints

pub mod checkpoint;
pub mod metrics;
pub mod scheduler;
pub mod tboard;
pub mod trainer;

pub use checkpoint::{BestCheckpoint, BestLoss};
pub use metrics::{Phase, PhaseSummary, RunningMetrics};
pub use scheduler::{CyclicLr, LrScheduler};
pub use tboard::{read_scalars, ScalarEvent, ScalarLogger};
pub use trainer::{train, EpochReport, Trainer, TrainingReport};
