//! Isolation Forest anomaly detection

use crate::anomaly::{check_n_features, check_training_data, AnomalyDetector, DetectorParams, ScoreOrientation};
use crate::error::{AnomalyError, Result};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation Forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IsolationForestParams {
    /// Expected proportion of anomalies, used to place the decision threshold
    pub contamination: f64,
    /// Seed for subsampling and split selection
    pub random_state: u64,
    /// Number of isolation trees
    pub n_estimators: usize,
    /// Rows drawn (without replacement) per tree, capped at the training size
    pub max_samples: usize,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            contamination: 0.1,
            random_state: 42,
            n_estimators: 100,
            max_samples: 256,
        }
    }
}

impl IsolationForestParams {
    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    pub fn with_max_samples(mut self, n: usize) -> Self {
        self.max_samples = n;
        self
    }

    /// Parse from a key-value record, rejecting unknown keys
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let params: Self = serde_json::from_value(value)
            .map_err(|e| AnomalyError::ConfigError(format!("isolation_forest: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(AnomalyError::ConfigError(format!(
                "isolation_forest.contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(AnomalyError::ConfigError(
                "isolation_forest.n_estimators must be at least 1".to_string(),
            ));
        }
        if self.max_samples < 2 {
            return Err(AnomalyError::ConfigError(
                "isolation_forest.max_samples must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Isolation Tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IsolationTree {
    /// Internal node with split
    Internal {
        /// Feature index for split
        feature: usize,
        /// Split threshold
        threshold: f64,
        /// Left subtree (values < threshold)
        left: Box<IsolationTree>,
        /// Right subtree (values >= threshold)
        right: Box<IsolationTree>,
    },
    /// External (leaf) node
    External {
        /// Number of samples in this node
        size: usize,
    },
}

impl IsolationTree {
    /// Build an isolation tree over the given row indices
    pub fn build(
        x: &Array2<f64>,
        indices: &[usize],
        height: usize,
        max_height: usize,
        rng: &mut impl Rng,
    ) -> Self {
        let n_samples = indices.len();

        if height >= max_height || n_samples <= 1 {
            return IsolationTree::External { size: n_samples };
        }

        let feature = rng.gen_range(0..x.ncols());

        let (min_val, max_val) = indices.iter().map(|&i| x[[i, feature]]).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), v| (lo.min(v), hi.max(v)),
        );

        // Constant feature on this subset: nothing left to isolate
        if max_val - min_val <= f64::EPSILON * max_val.abs().max(1.0) {
            return IsolationTree::External { size: n_samples };
        }

        let threshold = rng.gen_range(min_val..max_val);

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, feature]] < threshold);

        if left_indices.is_empty() || right_indices.is_empty() {
            return IsolationTree::External { size: n_samples };
        }

        let left = Box::new(Self::build(x, &left_indices, height + 1, max_height, rng));
        let right = Box::new(Self::build(x, &right_indices, height + 1, max_height, rng));

        IsolationTree::Internal {
            feature,
            threshold,
            left,
            right,
        }
    }

    /// Path length of a sample, with the unbuilt-subtree correction at leaves
    pub fn path_length(&self, sample: &ArrayView1<f64>, current_height: usize) -> f64 {
        match self {
            IsolationTree::External { size } => current_height as f64 + average_path_length(*size),
            IsolationTree::Internal {
                feature,
                threshold,
                left,
                right,
            } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, current_height + 1)
                } else {
                    right.path_length(sample, current_height + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points:
/// c(n) = 2 H(n-1) - 2(n-1)/n, with H(i) ≈ ln(i) + γ
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n_f = n as f64;
            2.0 * ((n_f - 1.0).ln() + EULER_GAMMA) - 2.0 * (n_f - 1.0) / n_f
        }
    }
}

/// Linear-interpolated quantile of an ascending slice
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Isolation Forest anomaly detector
///
/// Native score: `decision_function = offset - s(x)` where `s(x)` is the
/// normalized isolation score in (0, 1] and `offset` is the training-score
/// quantile matching `contamination`. Positive values are inliers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    params: IsolationForestParams,
    /// Fitted trees
    trees: Option<Vec<IsolationTree>>,
    /// Isolation score at the contamination quantile
    offset: Option<f64>,
    /// Subsample size used per tree
    n_samples: Option<usize>,
    /// Feature count seen during fit
    n_features: Option<usize>,
    /// Rows in the training matrix
    n_rows: Option<usize>,
}

impl IsolationForest {
    /// Create an untrained forest
    pub fn new(params: IsolationForestParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            trees: None,
            offset: None,
            n_samples: None,
            n_features: None,
            n_rows: None,
        })
    }

    /// Decision threshold on the isolation score (available after fit)
    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    /// Normalized isolation scores in (0, 1]; higher means easier to isolate
    pub fn score_samples(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let trees = self.trees.as_ref().ok_or(AnomalyError::ModelNotFitted)?;
        let n_features = self.n_features.ok_or(AnomalyError::ModelNotFitted)?;
        check_n_features(n_features, x)?;

        let c_n = average_path_length(self.n_samples.unwrap_or(2));
        let n_trees = trees.len() as f64;

        let scores: Vec<f64> = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| {
                let avg_path_length: f64 =
                    trees.iter().map(|tree| tree.path_length(&row, 0)).sum::<f64>() / n_trees;
                // s(x, n) = 2^(-E[h(x)] / c(n))
                2.0_f64.powf(-avg_path_length / c_n)
            })
            .collect();

        Ok(Array1::from_vec(scores))
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            params: IsolationForestParams::default(),
            trees: None,
            offset: None,
            n_samples: None,
            n_features: None,
            n_rows: None,
        }
    }
}

impl AnomalyDetector for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        check_training_data(x)?;
        let n_samples = x.nrows();
        if n_samples < 2 {
            return Err(AnomalyError::InvalidInput(format!(
                "isolation forest needs at least 2 training rows, got {}",
                n_samples
            )));
        }
        let samples_per_tree = self.params.max_samples.min(n_samples);
        let max_height = (samples_per_tree as f64).log2().ceil() as usize;

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.params.random_state);
        let tree_seeds: Vec<u64> = (0..self.params.n_estimators).map(|_| rng.gen()).collect();

        let trees: Vec<IsolationTree> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut tree_rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                let indices =
                    rand::seq::index::sample(&mut tree_rng, n_samples, samples_per_tree).into_vec();
                IsolationTree::build(x, &indices, 0, max_height, &mut tree_rng)
            })
            .collect();

        self.trees = Some(trees);
        self.n_samples = Some(samples_per_tree);
        self.n_features = Some(x.ncols());
        self.n_rows = Some(n_samples);

        let scores = self.score_samples(x)?;
        let mut sorted: Vec<f64> = scores.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let offset = quantile_sorted(&sorted, 1.0 - self.params.contamination);
        self.offset = Some(offset);

        debug!(
            n_trees = self.params.n_estimators,
            samples_per_tree,
            max_height,
            offset,
            "Isolation forest fitted"
        );
        Ok(())
    }

    fn n_training_rows(&self) -> Option<usize> {
        self.n_rows
    }

    fn is_fitted(&self) -> bool {
        self.trees.is_some() && self.offset.is_some()
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let offset = self.offset.ok_or(AnomalyError::ModelNotFitted)?;
        let scores = self.score_samples(x)?;
        Ok(scores.mapv(|s| offset - s))
    }

    fn score_orientation(&self) -> ScoreOrientation {
        ScoreOrientation::HigherIsNormal
    }

    fn get_params(&self) -> DetectorParams {
        DetectorParams::IsolationForest(self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn cluster_with_outliers() -> Array2<f64> {
        // Normal data cluster: 50 points with 2 features each
        let mut data = Vec::new();
        for i in 0..50 {
            data.push((i % 10) as f64);
            data.push(((i % 10) + 1) as f64);
        }
        // Add 2 outliers
        data.extend_from_slice(&[100.0, 100.0]);
        data.extend_from_slice(&[-50.0, -50.0]);

        Array2::from_shape_vec((52, 2), data).unwrap()
    }

    #[test]
    fn test_isolation_forest_basic() {
        let x = cluster_with_outliers();
        let params = IsolationForestParams::default()
            .with_n_estimators(50)
            .with_contamination(0.05);
        let mut iforest = IsolationForest::new(params).unwrap();
        iforest.fit(&x).unwrap();

        let scores = iforest.score_samples(&x).unwrap();
        assert!(scores[50] > scores[0]);
        assert!(scores[51] > scores[0]);

        let labels = iforest.predict(&x).unwrap();
        assert_eq!(labels[50], 1);
        assert_eq!(labels[51], 1);
        assert!(labels.iter().all(|&l| l == 0 || l == 1));
    }

    #[test]
    fn test_decision_function_orientation() {
        let x = cluster_with_outliers();
        let mut iforest = IsolationForest::new(IsolationForestParams::default().with_contamination(0.05)).unwrap();
        iforest.fit(&x).unwrap();

        // Native convention: inliers positive, outliers negative
        let decision = iforest.decision_function(&x).unwrap();
        assert!(decision[50] < 0.0);
        assert!(decision[51] < 0.0);
        assert!(decision[0] > decision[50]);

        // Anomaly scores flip the sign
        let anomaly = iforest.anomaly_scores(&x).unwrap();
        assert!(anomaly[50] > anomaly[0]);
        assert_eq!(anomaly[3], -decision[3]);
    }

    #[test]
    fn test_contamination_controls_flag_rate() {
        let x = cluster_with_outliers();
        let mut iforest = IsolationForest::new(IsolationForestParams::default().with_contamination(0.1)).unwrap();
        iforest.fit(&x).unwrap();

        let flagged = iforest.predict(&x).unwrap().iter().filter(|&&l| l == 1).count();
        // 10% of 52 rows, allowing for tied scores on the duplicated cluster points
        assert!(flagged >= 2 && flagged <= 15, "flagged {}", flagged);
    }

    #[test]
    fn test_same_seed_same_scores() {
        let x = cluster_with_outliers();
        let mut a = IsolationForest::new(IsolationForestParams::default()).unwrap();
        let mut b = IsolationForest::new(IsolationForestParams::default()).unwrap();
        a.fit(&x).unwrap();
        b.fit(&x).unwrap();
        assert_eq!(a.decision_function(&x).unwrap(), b.decision_function(&x).unwrap());
    }

    #[test]
    fn test_feature_count_mismatch() {
        let x = cluster_with_outliers();
        let mut iforest = IsolationForest::default();
        iforest.fit(&x).unwrap();
        let err = iforest.predict(&array![[1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, AnomalyError::ShapeError { .. }));
    }

    #[test]
    fn test_single_row_rejected() {
        let mut iforest = IsolationForest::default();
        let err = iforest.fit(&array![[1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, AnomalyError::InvalidInput(_)));
        assert!(!iforest.is_fitted());

        iforest.fit(&array![[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let scores = iforest.decision_function(&array![[1.0, 2.0]]).unwrap();
        assert!(scores.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_params_validation() {
        assert!(IsolationForest::new(IsolationForestParams::default().with_contamination(0.0)).is_err());
        assert!(IsolationForest::new(IsolationForestParams::default().with_contamination(0.7)).is_err());
        assert!(IsolationForest::new(IsolationForestParams::default().with_n_estimators(0)).is_err());

        let err = IsolationForestParams::from_value(serde_json::json!({
            "contamination": 0.1,
            "n_jobs": 4
        }))
        .unwrap_err();
        assert!(matches!(err, AnomalyError::ConfigError(_)));

        let params = IsolationForestParams::from_value(serde_json::json!({
            "contamination": 0.2,
            "random_state": 7
        }))
        .unwrap();
        assert_eq!(params.contamination, 0.2);
        assert_eq!(params.random_state, 7);
        assert_eq!(params.n_estimators, 100);
    }

    #[test]
    fn test_isolation_tree_path_length() {
        let x = Array2::from_shape_vec(
            (10, 2),
            vec![
                1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0, 4.0, 5.0, 5.0,
                6.0, 6.0, 7.0, 7.0, 8.0, 8.0, 9.0, 9.0, 10.0, 10.0,
            ],
        )
        .unwrap();

        let indices: Vec<usize> = (0..10).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let tree = IsolationTree::build(&x, &indices, 0, 10, &mut rng);

        let sample = array![5.0, 5.0];
        assert!(tree.path_length(&sample.view(), 0) > 0.0);
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) is roughly 10.24 (Liu et al., 2008)
        assert!((average_path_length(256) - 10.24).abs() < 0.05);
    }
}
