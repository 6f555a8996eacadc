//! Error types for the anomaly detection pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, AnomalyError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum AnomalyError {
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stratification error: {0}")]
    StratificationError(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("No trained models: call train_models() first")]
    NoTrainedModels,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AnomalyError {
    /// Whether the error is a precondition failure ("not ready") rather than bad input
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            AnomalyError::ModelNotFitted
                | AnomalyError::NoTrainedModels
                | AnomalyError::ModelNotFound(_)
        )
    }
}

impl From<polars::error::PolarsError> for AnomalyError {
    fn from(err: polars::error::PolarsError) -> Self {
        AnomalyError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for AnomalyError {
    fn from(err: serde_json::Error) -> Self {
        AnomalyError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for AnomalyError {
    fn from(err: bincode::Error) -> Self {
        AnomalyError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AnomalyError {
    fn from(err: ndarray::ShapeError) -> Self {
        AnomalyError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnomalyError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");

        let err = AnomalyError::ModelNotFound("svm".to_string());
        assert_eq!(err.to_string(), "Model not found: svm");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AnomalyError = io_err.into();
        assert!(matches!(err, AnomalyError::IoError(_)));
    }

    #[test]
    fn test_not_ready_kinds() {
        assert!(AnomalyError::ModelNotFitted.is_not_ready());
        assert!(AnomalyError::NoTrainedModels.is_not_ready());
        assert!(AnomalyError::ModelNotFound("x".into()).is_not_ready());
        assert!(!AnomalyError::DatasetNotFound("x".into()).is_not_ready());
        assert!(!AnomalyError::StratificationError("x".into()).is_not_ready());
    }
}
