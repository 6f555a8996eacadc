//! Split configuration

use crate::error::{AnomalyError, Result};
use serde::{Deserialize, Serialize};

/// Train/test split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed for the row shuffle
    pub random_state: u64,
    /// Preserve class proportions in both partitions
    pub stratify: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.3,
            random_state: 42,
            stratify: true,
        }
    }
}

impl SplitConfig {
    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_stratify(mut self, stratify: bool) -> Self {
        self.stratify = stratify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(AnomalyError::ConfigError(format!(
                "split.test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        Ok(())
    }
}
