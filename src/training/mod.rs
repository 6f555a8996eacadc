//! Model training module
//!
//! Trains the Isolation Forest on every training row and the One-Class SVM
//! on normal rows only, then scores both on the held-out partition.

mod config;
mod engine;

pub use config::{TrainingConfig, TrainingRegime};
pub use engine::{DetectorResult, TrainEngine};
