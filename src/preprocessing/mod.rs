//! Data preprocessing module
//!
//! Turns a labeled transaction table into train/test matrices:
//! - CSV loading and feature/label separation
//! - Seeded, optionally stratified train/test split
//! - Standard scaling fitted on the training partition only

mod config;
mod loader;
mod scaler;
mod split;

pub use config::SplitConfig;
pub use loader::{
    columns_to_array2, extract_labels, load, split_features_labels, summarize, DatasetSummary,
    FeatureMatrix,
};
pub use scaler::StandardScaler;
pub use split::{test_count, train_test_split, TrainTestSplit};
