//! Anomaly detection module
//!
//! Provides the two unsupervised detectors compared by the pipeline:
//! - Isolation Forest (ensemble of random isolation trees)
//! - One-Class SVM (ν-formulation, trained on normal rows only)
//!
//! Every detector reports a native `decision_function` where positive values
//! are inliers and negative values are outliers. Predictions are always
//! returned in the canonical polarity: `1` = anomaly, `0` = normal.

mod isolation_forest;
mod one_class_svm;

pub use isolation_forest::{IsolationForest, IsolationForestParams, IsolationTree};
pub use one_class_svm::{Gamma, Kernel, OneClassSvm, OneClassSvmParams};

use crate::error::{AnomalyError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Direction of a detector's native score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreOrientation {
    /// Larger native values mean "more normal"
    HigherIsNormal,
    /// Larger native values mean "more anomalous"
    HigherIsAnomalous,
}

impl ScoreOrientation {
    /// Convert native scores so that higher always means more anomalous
    pub fn to_anomaly_scores(self, native: Array1<f64>) -> Array1<f64> {
        match self {
            ScoreOrientation::HigherIsNormal => native.mapv(|v| -v),
            ScoreOrientation::HigherIsAnomalous => native,
        }
    }
}

/// Construction parameters of a detector, reported by `get_params`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "detector", rename_all = "snake_case")]
pub enum DetectorParams {
    IsolationForest(IsolationForestParams),
    OneClassSvm(OneClassSvmParams),
}

/// Predictions and scores for a batch of rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyResult {
    /// Canonical labels (1 = anomaly, 0 = normal)
    pub predictions: Array1<u8>,
    /// Native decision values (positive = inlier)
    pub decision_values: Array1<f64>,
    /// Scores oriented so that higher = more anomalous
    pub anomaly_scores: Array1<f64>,
    /// Number of rows flagged as anomalies
    pub n_anomalies: usize,
}

/// Trait for anomaly detectors
pub trait AnomalyDetector: Send + Sync {
    /// Stable identifier used as the result key
    fn name(&self) -> &'static str;

    /// Fit the detector on training data. Refitting replaces the previous state.
    fn fit(&mut self, x: &Array2<f64>) -> Result<()>;

    /// Whether `fit` has completed
    fn is_fitted(&self) -> bool;

    /// Rows seen by the last `fit`
    fn n_training_rows(&self) -> Option<usize>;

    /// Native decision values: positive = inlier, negative = outlier
    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Sign convention of `decision_function`
    fn score_orientation(&self) -> ScoreOrientation;

    /// Construction parameters
    fn get_params(&self) -> DetectorParams;

    /// Predict labels (1 = anomaly, 0 = normal)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        let decision = self.decision_function(x)?;
        Ok(decision.mapv(|d| u8::from(d < 0.0)))
    }

    /// Scores where higher means more anomalous
    fn anomaly_scores(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let native = self.decision_function(x)?;
        Ok(self.score_orientation().to_anomaly_scores(native))
    }

    /// Predictions and both score views in one pass
    fn detect(&self, x: &Array2<f64>) -> Result<AnomalyResult> {
        let decision_values = self.decision_function(x)?;
        let predictions = decision_values.mapv(|d| u8::from(d < 0.0));
        let anomaly_scores = self
            .score_orientation()
            .to_anomaly_scores(decision_values.clone());
        let n_anomalies = predictions.iter().filter(|&&p| p == 1).count();

        Ok(AnomalyResult {
            predictions,
            decision_values,
            anomaly_scores,
            n_anomalies,
        })
    }
}

/// Tagged detector used for storage and serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Detector {
    IsolationForest(IsolationForest),
    OneClassSvm(OneClassSvm),
}

impl Detector {
    /// Build an untrained detector from its parameters
    pub fn from_params(params: DetectorParams) -> Result<Self> {
        Ok(match params {
            DetectorParams::IsolationForest(p) => Detector::IsolationForest(IsolationForest::new(p)?),
            DetectorParams::OneClassSvm(p) => Detector::OneClassSvm(OneClassSvm::new(p)?),
        })
    }

    fn inner(&self) -> &dyn AnomalyDetector {
        match self {
            Detector::IsolationForest(m) => m,
            Detector::OneClassSvm(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AnomalyDetector {
        match self {
            Detector::IsolationForest(m) => m,
            Detector::OneClassSvm(m) => m,
        }
    }
}

impl From<IsolationForest> for Detector {
    fn from(model: IsolationForest) -> Self {
        Detector::IsolationForest(model)
    }
}

impl From<OneClassSvm> for Detector {
    fn from(model: OneClassSvm) -> Self {
        Detector::OneClassSvm(model)
    }
}

impl AnomalyDetector for Detector {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        self.inner_mut().fit(x)
    }

    fn is_fitted(&self) -> bool {
        self.inner().is_fitted()
    }

    fn n_training_rows(&self) -> Option<usize> {
        self.inner().n_training_rows()
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().decision_function(x)
    }

    fn score_orientation(&self) -> ScoreOrientation {
        self.inner().score_orientation()
    }

    fn get_params(&self) -> DetectorParams {
        self.inner().get_params()
    }
}

/// Reject empty training data
pub(crate) fn check_training_data(x: &Array2<f64>) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(AnomalyError::InvalidInput(format!(
            "training matrix must be non-empty, got {} x {}",
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

/// Reject matrices whose width differs from the training data
pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(AnomalyError::ShapeError {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
