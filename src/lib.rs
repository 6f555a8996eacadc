//! Kolosal Anomaly - anomaly detection training & evaluation pipeline
//!
//! Loads a labeled transaction table, trains two unsupervised detectors and
//! compares them on held-out labels.
//!
//! # Modules
//!
//! ## Core
//! - [`anomaly`] - Isolation Forest and One-Class SVM behind one trait
//! - [`preprocessing`] - CSV loading, stratified split, standard scaling
//! - [`metrics`] - Accuracy, precision, recall, F1, ROC-AUC, confusion metrics
//! - [`training`] - Training & evaluation engine with best-model selection
//!
//! ## Supporting
//! - [`config`] - Pipeline configuration (JSON)
//! - [`pipeline`] - One-call run of every stage
//! - [`export`] - Model persistence
//! - [`synthetic`] - Sample dataset generator
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use kolosal_anomaly::prelude::*;
//!
//! let config = PipelineConfig::default().with_data_path("data/creditcard.csv");
//! let run = run_pipeline(&config)?;
//! let (best, result) = run.engine.get_best_model()?;
//! println!("{best}: F1 = {:.4}", result.metrics.f1_score);
//! # Ok::<(), kolosal_anomaly::error::AnomalyError>(())
//! ```

// Core error handling
pub mod error;

// Core ML modules
pub mod anomaly;
pub mod metrics;
pub mod preprocessing;
pub mod training;

// Supporting modules
pub mod cli;
pub mod config;
pub mod export;
pub mod pipeline;
pub mod synthetic;

/// Commonly used items
pub mod prelude {
    pub use crate::anomaly::{
        AnomalyDetector, AnomalyResult, Detector, DetectorParams, Gamma, IsolationForest,
        IsolationForestParams, Kernel, OneClassSvm, OneClassSvmParams, ScoreOrientation,
    };
    pub use crate::config::PipelineConfig;
    pub use crate::error::{AnomalyError, Result};
    pub use crate::export::{FileModelStore, MemoryModelStore, ModelStore};
    pub use crate::metrics::{evaluate, MetricVector, METRIC_NAMES};
    pub use crate::pipeline::{run_pipeline, PipelineRun};
    pub use crate::preprocessing::{train_test_split, SplitConfig, StandardScaler, TrainTestSplit};
    pub use crate::training::{DetectorResult, TrainEngine, TrainingConfig};
}
