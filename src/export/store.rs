//! Storage backends for serialized artifacts

use crate::error::{AnomalyError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Named blob storage used to persist fitted models
pub trait ModelStore {
    /// Store `bytes` under `name`, replacing any previous blob
    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch the blob stored under `name`
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Names of all stored blobs, sorted
    fn list(&self) -> Result<Vec<String>>;
}

fn check_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(AnomalyError::InvalidInput(format!(
            "artifact name '{}' must be non-empty and use only [A-Za-z0-9_-]",
            name
        )));
    }
    Ok(())
}

/// Stores each artifact as `<dir>/<prefix>_<name>.bin`
#[derive(Debug, Clone)]
pub struct FileModelStore {
    dir: PathBuf,
    prefix: String,
}

impl FileModelStore {
    pub const EXTENSION: &'static str = "bin";

    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}.{}", self.prefix, name, Self::EXTENSION))
    }
}

impl ModelStore for FileModelStore {
    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        check_name(name)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        check_name(name)?;
        let path = self.path_for(name);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let head = format!("{}_", self.prefix);
        let tail = format!(".{}", Self::EXTENSION);
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let file_name = entry?.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name
                .strip_prefix(&head)
                .and_then(|rest| rest.strip_suffix(&tail))
            {
                if check_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// In-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryModelStore {
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl ModelStore for MemoryModelStore {
    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        check_name(name)?;
        self.blobs.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(name).cloned())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.blobs.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileModelStore::new(dir.path().join("models"), "fraud");

        store.save("isolation_forest", &[1, 2, 3]).unwrap();
        store.save("scaler", &[4]).unwrap();

        assert!(dir.path().join("models/fraud_isolation_forest.bin").is_file());
        assert_eq!(store.load("isolation_forest").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.load("one_class_svm").unwrap(), None);
        assert_eq!(store.list().unwrap(), vec!["isolation_forest".to_string(), "scaler".to_string()]);
    }

    #[test]
    fn test_file_store_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("other_model.bin"), b"x").unwrap();
        fs::write(dir.path().join("fraud_notes.txt"), b"x").unwrap();

        let store = FileModelStore::new(dir.path(), "fraud");
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut store = MemoryModelStore::new();
        assert!(store.save("../escape", &[0]).is_err());
        assert!(store.save("", &[0]).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_overwrites() {
        let mut store = MemoryModelStore::new();
        store.save("a", &[1]).unwrap();
        store.save("a", &[2]).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("a").unwrap(), Some(vec![2]));
    }
}
