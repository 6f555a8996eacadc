//! Evaluation metrics for binary anomaly labels
//!
//! The positive class is `1` (anomaly). Ratios whose denominator is zero are
//! reported as `0.0` instead of failing.

mod roc;

pub use roc::{roc_auc, roc_curve, RocCurve};

use crate::error::{AnomalyError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Display names of the metric vector entries, in order
pub const METRIC_NAMES: [&str; 5] = ["Accuracy", "Precision", "Recall", "F1_Score", "ROC_AUC"];

/// The five comparison metrics for one detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricVector {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
}

impl MetricVector {
    /// Values in the order of [`METRIC_NAMES`]
    pub fn to_array(&self) -> [f64; 5] {
        [self.accuracy, self.precision, self.recall, self.f1_score, self.roc_auc]
    }
}

/// Confusion counts plus the rates derived from them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMetrics {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
    /// TN / (TN + FP)
    pub specificity: f64,
    /// TP / (TP + FN)
    pub sensitivity: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
}

fn confusion_counts(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Result<Counts> {
    check_lengths(y_true.len(), y_pred.len())?;

    let mut counts = Counts::default();
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        match (t == 1, p == 1) {
            (true, true) => counts.tp += 1,
            (false, true) => counts.fp += 1,
            (false, false) => counts.tn += 1,
            (true, false) => counts.fn_ += 1,
        }
    }
    Ok(counts)
}

pub(crate) fn check_lengths(expected: usize, actual: usize) -> Result<()> {
    if expected == 0 {
        return Err(AnomalyError::InvalidInput("empty label vector".to_string()));
    }
    if expected != actual {
        return Err(AnomalyError::ShapeError {
            expected: format!("{} values", expected),
            actual: format!("{} values", actual),
        });
    }
    Ok(())
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Fraction of matching labels
pub fn accuracy(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Result<f64> {
    let c = confusion_counts(y_true, y_pred)?;
    Ok(ratio(c.tp + c.tn, y_true.len()))
}

/// TP / (TP + FP)
pub fn precision(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Result<f64> {
    let c = confusion_counts(y_true, y_pred)?;
    Ok(ratio(c.tp, c.tp + c.fp))
}

/// TP / (TP + FN)
pub fn recall(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Result<f64> {
    let c = confusion_counts(y_true, y_pred)?;
    Ok(ratio(c.tp, c.tp + c.fn_))
}

/// Harmonic mean of precision and recall
pub fn f1_score(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Result<f64> {
    let c = confusion_counts(y_true, y_pred)?;
    Ok(f1_from_counts(&c))
}

fn f1_from_counts(c: &Counts) -> f64 {
    let p = ratio(c.tp, c.tp + c.fp);
    let r = ratio(c.tp, c.tp + c.fn_);
    if p + r > 0.0 {
        2.0 * p * r / (p + r)
    } else {
        0.0
    }
}

/// Compute the full metric vector for one detector
///
/// `anomaly_scores` must be oriented so that higher means more anomalous.
/// When `y_true` holds a single class the ROC-AUC is undefined and 0.5 is
/// reported instead.
pub fn evaluate(
    y_true: &Array1<u8>,
    y_pred: &Array1<u8>,
    anomaly_scores: &Array1<f64>,
) -> Result<MetricVector> {
    let c = confusion_counts(y_true, y_pred)?;
    check_lengths(y_true.len(), anomaly_scores.len())?;

    let has_both_classes = c.tp + c.fn_ > 0 && c.tn + c.fp > 0;
    let roc_auc = if has_both_classes {
        roc_auc(y_true, anomaly_scores)?
    } else {
        warn!(n = y_true.len(), "Only one class present in y_true; reporting ROC-AUC as 0.5");
        0.5
    };

    Ok(MetricVector {
        accuracy: ratio(c.tp + c.tn, y_true.len()),
        precision: ratio(c.tp, c.tp + c.fp),
        recall: ratio(c.tp, c.tp + c.fn_),
        f1_score: f1_from_counts(&c),
        roc_auc,
    })
}

/// Confusion matrix entries with specificity and sensitivity
pub fn confusion_matrix_metrics(y_true: &Array1<u8>, y_pred: &Array1<u8>) -> Result<ConfusionMetrics> {
    let c = confusion_counts(y_true, y_pred)?;
    Ok(ConfusionMetrics {
        true_negatives: c.tn,
        false_positives: c.fp,
        false_negatives: c.fn_,
        true_positives: c.tp,
        specificity: ratio(c.tn, c.tn + c.fp),
        sensitivity: ratio(c.tp, c.tp + c.fn_),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_basic_metrics() {
        let y_true = array![1, 1, 0, 0, 1, 0];
        let y_pred = array![1, 0, 0, 1, 1, 0];

        assert!((accuracy(&y_true, &y_pred).unwrap() - 4.0 / 6.0).abs() < 1e-12);
        assert!((precision(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((recall(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((f1_score(&y_true, &y_pred).unwrap() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions() {
        let y_true = array![0, 0, 1, 0];
        let y_pred = array![0, 0, 0, 0];

        assert_eq!(precision(&y_true, &y_pred).unwrap(), 0.0);
        assert_eq!(recall(&y_true, &y_pred).unwrap(), 0.0);
        assert_eq!(f1_score(&y_true, &y_pred).unwrap(), 0.0);
        assert_eq!(accuracy(&y_true, &y_pred).unwrap(), 0.75);
    }

    #[test]
    fn test_all_zero_everything() {
        let y_true = array![0, 0, 0];
        let y_pred = array![0, 0, 0];
        assert_eq!(precision(&y_true, &y_pred).unwrap(), 0.0);
        assert_eq!(recall(&y_true, &y_pred).unwrap(), 0.0);
    }

    #[test]
    fn test_evaluate_is_finite_and_bounded() {
        let y_true = array![0, 0, 0, 1, 1, 0, 1, 0];
        let y_pred = array![0, 1, 0, 1, 0, 0, 1, 0];
        let scores = array![0.1, 0.7, 0.2, 0.9, 0.4, 0.3, 0.8, 0.0];

        let metrics = evaluate(&y_true, &y_pred, &scores).unwrap();
        let values = metrics.to_array();
        assert_eq!(values.len(), METRIC_NAMES.len());
        for v in values {
            assert!(v.is_finite() && (0.0..=1.0).contains(&v), "{}", v);
        }
        assert_eq!(values[3], metrics.f1_score);
    }

    #[test]
    fn test_evaluate_single_class_auc_fallback() {
        let y_true = array![0, 0, 0];
        let y_pred = array![0, 1, 0];
        let scores = array![0.1, 0.9, 0.2];

        let metrics = evaluate(&y_true, &y_pred, &scores).unwrap();
        assert_eq!(metrics.roc_auc, 0.5);
        assert!(roc_auc(&y_true, &scores).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let err = accuracy(&array![0, 1], &array![0]).unwrap_err();
        assert!(matches!(err, AnomalyError::ShapeError { .. }));

        let err = evaluate(&array![0, 1], &array![0, 1], &array![0.1]).unwrap_err();
        assert!(matches!(err, AnomalyError::ShapeError { .. }));
    }

    #[test]
    fn test_confusion_matrix_metrics() {
        let y_true = array![1, 1, 0, 0, 1, 0, 0];
        let y_pred = array![1, 0, 0, 1, 1, 0, 0];
        let cm = confusion_matrix_metrics(&y_true, &y_pred).unwrap();

        assert_eq!(cm.true_positives, 2);
        assert_eq!(cm.false_negatives, 1);
        assert_eq!(cm.false_positives, 1);
        assert_eq!(cm.true_negatives, 3);
        assert!((cm.specificity - 0.75).abs() < 1e-12);
        assert!((cm.sensitivity - 2.0 / 3.0).abs() < 1e-12);
    }
}
