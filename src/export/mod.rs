//! Model persistence
//!
//! Fitted detectors and the scaler are written through the [`ModelStore`]
//! port as checksummed bincode envelopes.

mod serializer;
mod store;

pub use serializer::{ModelMetadata, SerializedModel, DETECTOR_KIND, SCALER_KIND};
pub use store::{FileModelStore, MemoryModelStore, ModelStore};

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encode `value` with its metadata and store it under `metadata.name`
pub fn save_artifact<M: Serialize>(
    store: &mut dyn ModelStore,
    metadata: ModelMetadata,
    value: &M,
) -> Result<()> {
    let name = metadata.name.clone();
    let bytes = SerializedModel::encode(metadata, value)?;
    store.save(&name, &bytes)
}

/// Load and verify the artifact stored under `name`, if any
pub fn load_artifact<M: DeserializeOwned>(
    store: &dyn ModelStore,
    name: &str,
) -> Result<Option<(ModelMetadata, M)>> {
    let Some(bytes) = store.load(name)? else {
        return Ok(None);
    };
    let envelope = SerializedModel::from_bytes(&bytes)?;
    let value = envelope.decode()?;
    Ok(Some((envelope.metadata, value)))
}
