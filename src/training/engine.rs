//! Training and evaluation engine

use super::{TrainingConfig, TrainingRegime};
use crate::anomaly::{AnomalyDetector, AnomalyResult, Detector, DetectorParams};
use crate::error::{AnomalyError, Result};
use crate::export::{self, ModelMetadata, ModelStore, SerializedModel, DETECTOR_KIND};
use crate::metrics::{self, MetricVector, METRIC_NAMES};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info};

const ORDER_KEY: &str = "order";

/// Held-out evaluation of one detector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorResult {
    /// Canonical labels on the test partition (1 = anomaly)
    pub predictions: Array1<u8>,
    /// Anomaly-oriented scores (higher = more anomalous)
    pub scores: Array1<f64>,
    /// Native decision values (positive = inlier)
    pub raw_scores: Array1<f64>,
    pub metrics: MetricVector,
    /// Wall-clock fit time in seconds
    pub training_time_secs: f64,
}

#[derive(Debug, Clone)]
struct TrainedEntry {
    name: String,
    detector: Detector,
    metrics: Option<MetricVector>,
}

/// Trains both detectors, evaluates them on held-out labels and keeps the results
///
/// Results are kept in training order so that ties in F1 resolve to the
/// detector trained first.
#[derive(Debug, Clone)]
pub struct TrainEngine {
    config: TrainingConfig,
    feature_names: Vec<String>,
    entries: Vec<TrainedEntry>,
    results: Vec<(String, DetectorResult)>,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            feature_names: Vec::new(),
            entries: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Record feature names for saved metadata
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Detectors to train, in order, with the rows each one sees
    fn roster(&self) -> Result<Vec<(Detector, TrainingRegime)>> {
        Ok(vec![
            (
                Detector::from_params(DetectorParams::IsolationForest(self.config.isolation_forest.clone()))?,
                TrainingRegime::AllRows,
            ),
            (
                Detector::from_params(DetectorParams::OneClassSvm(self.config.one_class_svm.clone()))?,
                TrainingRegime::NormalRowsOnly,
            ),
        ])
    }

    /// Train every detector and evaluate it on the test partition
    ///
    /// Previous results are discarded. Results become visible only once every
    /// detector has been trained and evaluated; on error the engine holds none.
    pub fn train_models(
        &mut self,
        x_train: &Array2<f64>,
        x_test: &Array2<f64>,
        y_train: &Array1<u8>,
        y_test: &Array1<u8>,
    ) -> Result<&[(String, DetectorResult)]> {
        check_partition(x_train, y_train, "training")?;
        check_partition(x_test, y_test, "test")?;
        if x_train.ncols() != x_test.ncols() {
            return Err(AnomalyError::ShapeError {
                expected: format!("{} features", x_train.ncols()),
                actual: format!("{} features in test partition", x_test.ncols()),
            });
        }

        let roster = self.roster()?;
        // A failed run leaves nothing behind
        self.entries.clear();
        self.results.clear();

        let mut entries = Vec::with_capacity(roster.len());
        let mut results = Vec::with_capacity(roster.len());

        let start = Instant::now();
        for (mut detector, regime) in roster {
            let name = detector.name().to_string();
            let rows = training_rows(x_train, y_train, regime)?;

            info!(model = %name, rows = rows.nrows(), regime = ?regime, "Training detector");
            let fit_start = Instant::now();
            detector.fit(&rows)?;
            let training_time_secs = fit_start.elapsed().as_secs_f64();

            let AnomalyResult {
                predictions,
                decision_values,
                anomaly_scores,
                n_anomalies,
            } = detector.detect(x_test)?;
            let metrics = metrics::evaluate(y_test, &predictions, &anomaly_scores)?;

            info!(
                model = %name,
                secs = training_time_secs,
                flagged = n_anomalies,
                f1 = metrics.f1_score,
                roc_auc = metrics.roc_auc,
                "Detector evaluated"
            );

            entries.push(TrainedEntry {
                name: name.clone(),
                detector,
                metrics: Some(metrics),
            });
            results.push((
                name,
                DetectorResult {
                    predictions,
                    scores: anomaly_scores,
                    raw_scores: decision_values,
                    metrics,
                    training_time_secs,
                },
            ));
        }

        self.entries = entries;
        self.results = results;

        info!(
            models = self.results.len(),
            secs = start.elapsed().as_secs_f64(),
            "Training complete"
        );
        Ok(&self.results)
    }

    /// All results, in training order
    pub fn results(&self) -> Result<&[(String, DetectorResult)]> {
        if self.results.is_empty() {
            return Err(AnomalyError::NoTrainedModels);
        }
        Ok(&self.results)
    }

    /// Result of one detector
    pub fn result(&self, name: &str) -> Result<&DetectorResult> {
        self.results()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
            .ok_or_else(|| AnomalyError::ModelNotFound(name.to_string()))
    }

    /// Fitted detector by name
    pub fn detector(&self, name: &str) -> Result<&Detector> {
        if self.entries.is_empty() {
            return Err(AnomalyError::NoTrainedModels);
        }
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.detector)
            .ok_or_else(|| AnomalyError::ModelNotFound(name.to_string()))
    }

    /// Names of the fitted detectors
    pub fn detector_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Detector with the highest F1; the earlier one wins ties
    pub fn get_best_model(&self) -> Result<(&str, &DetectorResult)> {
        let results = self.results()?;
        let best = best_index(results.iter().map(|(_, r)| r.metrics.f1_score))
            .ok_or(AnomalyError::NoTrainedModels)?;
        let (name, result) = &results[best];
        Ok((name.as_str(), result))
    }

    /// One row per detector with the five metrics
    pub fn performance_summary(&self) -> Result<DataFrame> {
        let results = self.results()?;

        let names: Vec<String> = results.iter().map(|(n, _)| display_name(n)).collect();
        let mut columns = vec![Column::new("Model".into(), names)];
        for (i, metric) in METRIC_NAMES.iter().enumerate() {
            let values: Vec<f64> = results.iter().map(|(_, r)| r.metrics.to_array()[i]).collect();
            columns.push(Column::new((*metric).into(), values));
        }

        Ok(DataFrame::new(columns)?)
    }

    /// Predict with a named detector, or the best one when `model` is `None`
    pub fn predict_anomalies(&self, x: &Array2<f64>, model: Option<&str>) -> Result<AnomalyResult> {
        let name = match model {
            Some(name) => name,
            None => self.best_detector_name()?,
        };
        debug!(model = name, rows = x.nrows(), "Predicting anomalies");
        self.detector(name)?.detect(x)
    }

    fn best_detector_name(&self) -> Result<&str> {
        if self.entries.is_empty() {
            return Err(AnomalyError::NoTrainedModels);
        }
        let best = best_index(
            self.entries
                .iter()
                .map(|e| e.metrics.map_or(f64::NEG_INFINITY, |m| m.f1_score)),
        )
        .unwrap_or(0);
        Ok(&self.entries[best].name)
    }

    /// Write every fitted detector to `store`
    pub fn save_models(&self, store: &mut dyn ModelStore) -> Result<usize> {
        if self.entries.is_empty() {
            return Err(AnomalyError::NoTrainedModels);
        }

        for (order, entry) in self.entries.iter().enumerate() {
            let mut metadata = ModelMetadata::new(&entry.name, DETECTOR_KIND)
                .with_features(self.feature_names.clone())
                .with_extra(ORDER_KEY, order.to_string());
            if let Some(m) = entry.metrics {
                metadata = metadata.with_metrics(m);
            }
            export::save_artifact(store, metadata, &entry.detector)?;
        }

        info!(models = self.entries.len(), "Models saved");
        Ok(self.entries.len())
    }

    /// Replace the fitted detectors with those found in `store`
    ///
    /// Evaluation results are not restored; stored metrics still drive the
    /// default model of [`Self::predict_anomalies`].
    pub fn load_models(&mut self, store: &dyn ModelStore) -> Result<usize> {
        let mut loaded = Vec::new();
        for name in store.list()? {
            let Some(bytes) = store.load(&name)? else {
                continue;
            };
            let envelope = SerializedModel::from_bytes(&bytes)?;
            if envelope.metadata.kind != DETECTOR_KIND {
                continue;
            }

            let detector: Detector = envelope.decode()?;
            if !detector.is_fitted() {
                return Err(AnomalyError::SerializationError(format!(
                    "artifact '{}' holds an unfitted detector",
                    name
                )));
            }
            let order = envelope
                .metadata
                .extra
                .get(ORDER_KEY)
                .and_then(|o| o.parse::<usize>().ok())
                .unwrap_or(usize::MAX);
            loaded.push((order, envelope.metadata, detector));
        }

        if loaded.is_empty() {
            return Err(AnomalyError::ModelNotFound("no detector artifacts in store".to_string()));
        }
        loaded.sort_by_key(|(order, _, _)| *order);

        self.results.clear();
        self.feature_names = loaded[0].1.feature_names.clone();
        self.entries = loaded
            .into_iter()
            .map(|(_, metadata, detector)| TrainedEntry {
                name: metadata.name,
                detector,
                metrics: metadata.metrics,
            })
            .collect();

        info!(models = self.entries.len(), "Models loaded");
        Ok(self.entries.len())
    }
}

impl Default for TrainEngine {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

/// `isolation_forest` -> `Isolation Forest`
fn display_name(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// First index holding the maximum value
fn best_index(values: impl Iterator<Item = f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn check_partition(x: &Array2<f64>, y: &Array1<u8>, which: &str) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(AnomalyError::ShapeError {
            expected: format!("{} labels for the {} partition", x.nrows(), which),
            actual: format!("{} labels", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(AnomalyError::InvalidInput(format!("{} partition is empty", which)));
    }
    Ok(())
}

fn training_rows<'a>(
    x_train: &'a Array2<f64>,
    y_train: &Array1<u8>,
    regime: TrainingRegime,
) -> Result<Cow<'a, Array2<f64>>> {
    match regime {
        TrainingRegime::AllRows => Ok(Cow::Borrowed(x_train)),
        TrainingRegime::NormalRowsOnly => {
            let normal: Vec<usize> = y_train
                .iter()
                .enumerate()
                .filter(|(_, &label)| label == 0)
                .map(|(i, _)| i)
                .collect();
            if normal.is_empty() {
                return Err(AnomalyError::InvalidInput(
                    "training partition has no normal rows".to_string(),
                ));
            }
            Ok(Cow::Owned(x_train.select(Axis(0), &normal)))
        }
    }
}
