//! Training configuration

use crate::anomaly::{IsolationForestParams, OneClassSvmParams};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Rows a detector is fitted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingRegime {
    /// The full training partition, anomalies included
    AllRows,
    /// Only training rows labeled normal (0)
    NormalRowsOnly,
}

/// Hyperparameters of the detectors trained by [`super::TrainEngine`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    pub isolation_forest: IsolationForestParams,
    pub one_class_svm: OneClassSvmParams,
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_forest(mut self, params: IsolationForestParams) -> Self {
        self.isolation_forest = params;
        self
    }

    pub fn with_one_class_svm(mut self, params: OneClassSvmParams) -> Self {
        self.one_class_svm = params;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.isolation_forest.validate()?;
        self.one_class_svm.validate()
    }
}
