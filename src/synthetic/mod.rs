//! Synthetic transaction data
//!
//! Generates a labeled table shaped like the credit-card fraud dataset:
//! a `Time` column, Gaussian features `V1..Vn` and a binary `Class` column.
//! Anomalous rows receive extra Gaussian noise so that they spread away from
//! the bulk of the data.

use crate::error::{AnomalyError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Shape and randomness of the generated dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SampleDatasetConfig {
    pub n_samples: usize,
    pub n_features: usize,
    /// Fraction of rows labeled 1
    pub anomaly_ratio: f64,
    /// Standard deviation of the noise added to anomalous rows
    pub anomaly_spread: f64,
    pub seed: u64,
}

impl Default for SampleDatasetConfig {
    fn default() -> Self {
        Self {
            n_samples: 10_000,
            n_features: 28,
            anomaly_ratio: 0.01,
            anomaly_spread: 2.0,
            seed: 42,
        }
    }
}

impl SampleDatasetConfig {
    pub fn with_samples(mut self, n: usize) -> Self {
        self.n_samples = n;
        self
    }

    pub fn with_features(mut self, n: usize) -> Self {
        self.n_features = n;
        self
    }

    pub fn with_anomaly_ratio(mut self, ratio: f64) -> Self {
        self.anomaly_ratio = ratio;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn n_anomalies(&self) -> usize {
        (self.anomaly_ratio * self.n_samples as f64) as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_samples == 0 || self.n_features == 0 {
            return Err(AnomalyError::ConfigError(
                "n_samples and n_features must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.anomaly_ratio) {
            return Err(AnomalyError::ConfigError(format!(
                "anomaly_ratio must be in [0, 1), got {}",
                self.anomaly_ratio
            )));
        }
        Ok(())
    }
}

/// Standard normal draw (Box-Muller)
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Feature matrix and labels of the sample dataset
pub fn sample_arrays(config: &SampleDatasetConfig) -> Result<(Array2<f64>, Array1<u8>)> {
    config.validate()?;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);

    let mut x = Array2::from_shape_simple_fn((config.n_samples, config.n_features), || {
        standard_normal(&mut rng)
    });
    let mut y = Array1::zeros(config.n_samples);

    let anomalies = index::sample(&mut rng, config.n_samples, config.n_anomalies());
    for i in anomalies.iter() {
        y[i] = 1u8;
        for v in x.row_mut(i).iter_mut() {
            *v += standard_normal(&mut rng) * config.anomaly_spread;
        }
    }

    Ok((x, y))
}

/// Sample dataset as a table with `Time`, `V1..Vn` and `Class` columns
pub fn sample_dataset(config: &SampleDatasetConfig) -> Result<DataFrame> {
    let (x, y) = sample_arrays(config)?;

    let mut columns = Vec::with_capacity(config.n_features + 2);
    columns.push(Column::new("Time".into(), (0..config.n_samples as i64).collect::<Vec<_>>()));
    for (j, col) in x.columns().into_iter().enumerate() {
        columns.push(Column::new(format!("V{}", j + 1).into(), col.to_vec()));
    }
    columns.push(Column::new(
        "Class".into(),
        y.iter().map(|&l| l as i64).collect::<Vec<_>>(),
    ));

    Ok(DataFrame::new(columns)?)
}

/// Write a table as CSV with a header row
pub fn write_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    info!(path = %path.display(), rows = df.height(), cols = df.width(), "CSV written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_dataset_shape() {
        let config = SampleDatasetConfig::default().with_samples(500).with_features(5);
        let df = sample_dataset(&config).unwrap();

        assert_eq!(df.height(), 500);
        assert_eq!(df.width(), 7);
        let names: Vec<String> = df.get_column_names().iter().map(|c| c.to_string()).collect();
        assert_eq!(names.first().map(String::as_str), Some("Time"));
        assert_eq!(names.last().map(String::as_str), Some("Class"));
        assert_eq!(names[1], "V1");

        let anomalies = df.column("Class").unwrap().i64().unwrap().sum().unwrap();
        assert_eq!(anomalies, 5);
    }

    #[test]
    fn test_seeded_generation() {
        let config = SampleDatasetConfig::default().with_samples(200).with_features(3);
        let (xa, ya) = sample_arrays(&config).unwrap();
        let (xb, yb) = sample_arrays(&config).unwrap();
        assert_eq!(xa, xb);
        assert_eq!(ya, yb);

        let (xc, _) = sample_arrays(&config.clone().with_seed(7)).unwrap();
        assert_ne!(xa, xc);
    }

    #[test]
    fn test_standard_normal_moments() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
        let draws: Vec<f64> = (0..20_000).map(|_| standard_normal(&mut rng)).collect();
        let mean = draws.iter().sum::<f64>() / draws.len() as f64;
        let var = draws.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / draws.len() as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_invalid_config() {
        assert!(SampleDatasetConfig::default().with_samples(0).validate().is_err());
        assert!(SampleDatasetConfig::default().with_anomaly_ratio(1.0).validate().is_err());
    }

    #[test]
    fn test_write_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/sample.csv");
        let mut df = sample_dataset(&SampleDatasetConfig::default().with_samples(50).with_features(2)).unwrap();
        write_csv(&mut df, &path).unwrap();

        let loaded = crate::preprocessing::load(&path).unwrap();
        assert_eq!(loaded.shape(), (50, 4));
    }
}
