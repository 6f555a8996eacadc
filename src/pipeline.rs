//! End-to-end pipeline: load → split → scale → train → evaluate

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::export::{self, ModelMetadata, ModelStore, SCALER_KIND};
use crate::preprocessing::{self, DatasetSummary, FeatureMatrix, StandardScaler, TrainTestSplit};
use crate::training::TrainEngine;
use ndarray::{Array1, Array2};
use polars::prelude::DataFrame;
use std::time::Instant;
use tracing::{info, info_span};

/// Store key of the persisted scaler
pub const SCALER_ARTIFACT: &str = "scaler";

/// Everything produced by one run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub feature_names: Vec<String>,
    pub summary: DatasetSummary,
    /// Partitions after scaling
    pub split: TrainTestSplit,
    /// Present when scaling was enabled
    pub scaler: Option<StandardScaler>,
    pub engine: TrainEngine,
}

impl PipelineRun {
    /// Persist the fitted detectors and the scaler
    pub fn save(&self, store: &mut dyn ModelStore) -> Result<()> {
        self.engine.save_models(store)?;
        if let Some(scaler) = &self.scaler {
            let metadata = ModelMetadata::new(SCALER_ARTIFACT, SCALER_KIND)
                .with_features(self.feature_names.clone());
            export::save_artifact(store, metadata, scaler)?;
        }
        Ok(())
    }
}

/// Load the dataset named in `config` and run every stage
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineRun> {
    config.validate()?;
    let _span = info_span!("pipeline", data = %config.data_path.display()).entered();

    let df = preprocessing::load(&config.data_path)?;
    run_on_dataframe(&df, config)
}

/// Run every stage on an already-loaded table
pub fn run_on_dataframe(df: &DataFrame, config: &PipelineConfig) -> Result<PipelineRun> {
    let (features, labels) =
        preprocessing::split_features_labels(df, &config.label_column, &config.drop_columns)?;
    run_on_features(features, labels, config)
}

/// Run split, scaling and training on a prepared feature matrix
pub fn run_on_features(
    features: FeatureMatrix,
    labels: Array1<u8>,
    config: &PipelineConfig,
) -> Result<PipelineRun> {
    config.validate()?;
    let start = Instant::now();

    let n_anomalies = labels.iter().filter(|&&l| l == 1).count();
    let summary = DatasetSummary {
        n_rows: features.n_rows(),
        n_columns: features.n_features(),
        n_anomalies,
        anomaly_ratio: if labels.is_empty() { 0.0 } else { n_anomalies as f64 / labels.len() as f64 },
    };
    info!(
        rows = summary.n_rows,
        features = summary.n_columns,
        anomalies = summary.n_anomalies,
        "Features prepared"
    );

    let mut split = preprocessing::train_test_split(&features.values, &labels, &config.split)?;
    info!(train = split.x_train.nrows(), test = split.x_test.nrows(), "Data split");

    let scaler = if config.scale_features {
        let mut scaler = StandardScaler::new();
        split.x_train = scaler.fit_transform(&split.x_train)?;
        split.x_test = scaler.transform(&split.x_test)?;
        Some(scaler)
    } else {
        None
    };

    let mut engine = TrainEngine::new(config.training()).with_feature_names(features.names.clone());
    engine.train_models(&split.x_train, &split.x_test, &split.y_train, &split.y_test)?;

    if let Ok((best, result)) = engine.get_best_model() {
        info!(
            best = best,
            f1 = result.metrics.f1_score,
            secs = start.elapsed().as_secs_f64(),
            "Pipeline finished"
        );
    }

    Ok(PipelineRun {
        feature_names: features.names,
        summary,
        split,
        scaler,
        engine,
    })
}

/// Load the persisted scaler, if one was saved
pub fn load_scaler(store: &dyn ModelStore) -> Result<Option<StandardScaler>> {
    Ok(export::load_artifact::<StandardScaler>(store, SCALER_ARTIFACT)?.map(|(_, scaler)| scaler))
}

/// Apply an optional scaler
pub fn prepare_for_inference(x: &Array2<f64>, scaler: Option<&StandardScaler>) -> Result<Array2<f64>> {
    match scaler {
        Some(scaler) => scaler.transform(x),
        None => Ok(x.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{IsolationForestParams, OneClassSvmParams};
    use crate::error::AnomalyError;
    use crate::export::MemoryModelStore;
    use crate::synthetic::{sample_dataset, SampleDatasetConfig};

    fn small_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_isolation_forest(IsolationForestParams::default().with_n_estimators(30))
            .with_one_class_svm(OneClassSvmParams::default().with_nu(0.05))
    }

    #[test]
    fn test_run_on_dataframe() {
        let df = sample_dataset(&SampleDatasetConfig::default().with_samples(400).with_features(4).with_anomaly_ratio(0.05))
            .unwrap();
        let run = run_on_dataframe(&df, &small_config()).unwrap();

        assert_eq!(run.feature_names, vec!["V1", "V2", "V3", "V4"]);
        assert_eq!(run.summary.n_anomalies, 20);
        assert_eq!(run.split.x_test.nrows(), 120);
        assert!(run.scaler.is_some());
        assert_eq!(run.engine.results().unwrap().len(), 2);
    }

    #[test]
    fn test_scaling_disabled() {
        let df = sample_dataset(&SampleDatasetConfig::default().with_samples(200).with_features(3).with_anomaly_ratio(0.05))
            .unwrap();
        let run = run_on_dataframe(&df, &small_config().with_scaling(false)).unwrap();
        assert!(run.scaler.is_none());

        let x = run.split.x_test.clone();
        assert_eq!(prepare_for_inference(&x, None).unwrap(), x);
    }

    #[test]
    fn test_missing_dataset() {
        let config = small_config().with_data_path("missing/creditcard.csv");
        let err = run_pipeline(&config).unwrap_err();
        assert!(matches!(err, AnomalyError::DatasetNotFound(_)));
    }

    #[test]
    fn test_save_persists_scaler() {
        let df = sample_dataset(&SampleDatasetConfig::default().with_samples(200).with_features(3).with_anomaly_ratio(0.05))
            .unwrap();
        let run = run_on_dataframe(&df, &small_config()).unwrap();

        let mut store = MemoryModelStore::new();
        run.save(&mut store).unwrap();
        assert_eq!(store.len(), 3);

        let scaler = load_scaler(&store).unwrap().unwrap();
        assert_eq!(Some(&scaler), run.scaler.as_ref());
    }
}
