//! Model serialization utilities
//!
//! Every artifact is wrapped in a [`SerializedModel`] envelope: magic bytes,
//! format version, metadata and an FNV-1a checksum over the payload.

use crate::error::{AnomalyError, Result};
use crate::metrics::MetricVector;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind tag for fitted detectors
pub const DETECTOR_KIND: &str = "detector";
/// Kind tag for the fitted feature scaler
pub const SCALER_KIND: &str = "scaler";

/// Model metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Artifact name (store key)
    pub name: String,
    /// Artifact kind, e.g. [`DETECTOR_KIND`]
    pub kind: String,
    /// Crate version that wrote the artifact
    pub version: String,
    /// Save timestamp (RFC 3339)
    pub saved_at: String,
    /// Feature columns the artifact was fitted on
    pub feature_names: Vec<String>,
    /// Held-out metrics, when known
    pub metrics: Option<MetricVector>,
    /// Additional metadata
    pub extra: BTreeMap<String, String>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            saved_at: chrono::Utc::now().to_rfc3339(),
            feature_names: Vec::new(),
            metrics: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.feature_names = features;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricVector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Serializable model wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedModel {
    /// Magic bytes for format detection
    pub magic: [u8; 4],
    /// Format version
    pub format_version: u32,
    /// Model metadata
    pub metadata: ModelMetadata,
    /// bincode-encoded model
    pub model_data: Vec<u8>,
    /// Checksum for integrity verification
    pub checksum: u64,
}

impl SerializedModel {
    pub const MAGIC: [u8; 4] = [b'K', b'A', b'N', b'M'];
    pub const VERSION: u32 = 1;

    /// Wrap an already-encoded payload
    pub fn new(metadata: ModelMetadata, model_data: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&model_data);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            metadata,
            model_data,
            checksum,
        }
    }

    /// Encode a model and its metadata into a self-checking blob
    pub fn encode<M: Serialize>(metadata: ModelMetadata, model: &M) -> Result<Vec<u8>> {
        let model_data = bincode::serialize(model)?;
        Ok(bincode::serialize(&Self::new(metadata, model_data))?)
    }

    /// Parse a blob and verify magic, version and checksum
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let envelope: SerializedModel = bincode::deserialize(bytes)
            .map_err(|e| AnomalyError::SerializationError(format!("Failed to read model envelope: {}", e)))?;

        if envelope.magic != Self::MAGIC {
            return Err(AnomalyError::SerializationError(
                "Not a model artifact (bad magic bytes)".to_string(),
            ));
        }
        if envelope.format_version != Self::VERSION {
            return Err(AnomalyError::SerializationError(format!(
                "Unsupported format version {} (expected {})",
                envelope.format_version,
                Self::VERSION
            )));
        }
        if !envelope.verify_checksum() {
            return Err(AnomalyError::SerializationError(
                "Checksum verification failed - artifact may be corrupted".to_string(),
            ));
        }
        Ok(envelope)
    }

    /// Decode the payload
    pub fn decode<M: DeserializeOwned>(&self) -> Result<M> {
        bincode::deserialize(&self.model_data)
            .map_err(|e| AnomalyError::SerializationError(format!("Failed to deserialize model: {}", e)))
    }

    /// Compute checksum using FNV-1a hash
    fn compute_checksum(data: &[u8]) -> u64 {
        const FNV_OFFSET: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;

        data.iter().fold(FNV_OFFSET, |hash, &byte| {
            (hash ^ byte as u64).wrapping_mul(FNV_PRIME)
        })
    }

    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.model_data) == self.checksum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::StandardScaler;
    use ndarray::array;

    #[test]
    fn test_envelope_round_trip() {
        let mut scaler = StandardScaler::new();
        scaler.fit(&array![[1.0, 2.0], [3.0, 5.0]]).unwrap();

        let metadata = ModelMetadata::new("scaler", SCALER_KIND).with_features(vec!["a".into(), "b".into()]);
        let bytes = SerializedModel::encode(metadata.clone(), &scaler).unwrap();

        let envelope = SerializedModel::from_bytes(&bytes).unwrap();
        assert_eq!(envelope.metadata, metadata);
        let restored: StandardScaler = envelope.decode().unwrap();
        assert_eq!(restored, scaler);
    }

    #[test]
    fn test_corruption_detected() {
        let bytes = SerializedModel::encode(ModelMetadata::new("x", "test"), &vec![1.5f64; 8]).unwrap();

        let mut corrupted = bytes.clone();
        let last = corrupted.len() - 9;
        corrupted[last] ^= 0xFF;
        let err = SerializedModel::from_bytes(&corrupted).unwrap_err();
        assert!(matches!(err, AnomalyError::SerializationError(_)));

        assert!(SerializedModel::from_bytes(b"garbage").is_err());
    }

    #[test]
    fn test_bad_magic() {
        let mut envelope = SerializedModel::new(ModelMetadata::new("x", "test"), vec![1, 2, 3]);
        envelope.magic = *b"NOPE";
        let bytes = bincode::serialize(&envelope).unwrap();
        let err = SerializedModel::from_bytes(&bytes).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_checksum_known_value() {
        // FNV-1a of the empty input is the offset basis
        assert_eq!(SerializedModel::compute_checksum(&[]), 14695981039346656037);
    }
}
