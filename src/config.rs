//! Pipeline configuration

use crate::anomaly::{IsolationForestParams, OneClassSvmParams};
use crate::error::{AnomalyError, Result};
use crate::preprocessing::SplitConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a pipeline run needs, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Input CSV
    pub data_path: PathBuf,

    /// Binary label column (1 = anomaly, 0 = normal)
    pub label_column: String,

    /// Non-predictive columns removed before training; absent columns are ignored
    pub drop_columns: Vec<String>,

    pub split: SplitConfig,

    /// Standardize features with statistics from the training partition
    pub scale_features: bool,

    pub isolation_forest: IsolationForestParams,

    pub one_class_svm: OneClassSvmParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/creditcard.csv"),
            label_column: "Class".to_string(),
            drop_columns: vec!["Time".to_string()],
            split: SplitConfig::default(),
            scale_features: true,
            isolation_forest: IsolationForestParams::default(),
            one_class_svm: OneClassSvmParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnomalyError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| AnomalyError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn with_label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = column.into();
        self
    }

    pub fn with_drop_columns(mut self, columns: Vec<String>) -> Self {
        self.drop_columns = columns;
        self
    }

    pub fn with_split(mut self, split: SplitConfig) -> Self {
        self.split = split;
        self
    }

    pub fn with_scaling(mut self, enabled: bool) -> Self {
        self.scale_features = enabled;
        self
    }

    pub fn with_isolation_forest(mut self, params: IsolationForestParams) -> Self {
        self.isolation_forest = params;
        self
    }

    pub fn with_one_class_svm(mut self, params: OneClassSvmParams) -> Self {
        self.one_class_svm = params;
        self
    }

    /// Detector hyperparameters for the training engine
    pub fn training(&self) -> TrainingConfig {
        TrainingConfig::new()
            .with_isolation_forest(self.isolation_forest.clone())
            .with_one_class_svm(self.one_class_svm.clone())
    }

    pub fn validate(&self) -> Result<()> {
        if self.label_column.is_empty() {
            return Err(AnomalyError::ConfigError("label_column must not be empty".to_string()));
        }
        if self.drop_columns.iter().any(|c| c == &self.label_column) {
            return Err(AnomalyError::ConfigError(format!(
                "label column '{}' cannot also be dropped",
                self.label_column
            )));
        }
        self.split.validate()?;
        self.training().validate()
    }
}
