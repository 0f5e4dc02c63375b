// Expert - image classifier training loop
// Library exports

pub mod config;
pub mod data; // Datasets, train/val split, batch loading
pub mod errors;
pub mod models; // Expert classifier and checkpoint persistence
pub mod training; // Epoch loop, cyclical LR, best-loss checkpoints

pub use training::{train, TrainingReport};
