//! ROC curve and area under it

use super::check_lengths;
use crate::error::{AnomalyError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Receiver operating characteristic curve
///
/// Points are ordered by decreasing threshold and start at (0, 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    /// Score at which each point is reached; the first entry is +inf
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    /// Trapezoidal area under the curve
    pub fn auc(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }
}

/// Build the ROC curve, with one point per distinct score
///
/// Rows sharing a score move the curve diagonally, which is how ties are
/// credited half.
pub fn roc_curve(y_true: &Array1<u8>, scores: &Array1<f64>) -> Result<RocCurve> {
    check_lengths(y_true.len(), scores.len())?;
    if scores.iter().any(|s| s.is_nan()) {
        return Err(AnomalyError::InvalidInput("scores contain NaN".to_string()));
    }

    let n_pos = y_true.iter().filter(|&&t| t == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(AnomalyError::InvalidInput(
            "ROC-AUC needs both classes in y_true".to_string(),
        ));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut thresholds = vec![f64::INFINITY];

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if y_true[order[i]] == 1 {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        fpr.push(fp as f64 / n_neg as f64);
        tpr.push(tp as f64 / n_pos as f64);
        thresholds.push(threshold);
    }

    Ok(RocCurve { fpr, tpr, thresholds })
}

/// Area under the ROC curve for anomaly-oriented scores (higher = more anomalous)
pub fn roc_auc(y_true: &Array1<u8>, scores: &Array1<f64>) -> Result<f64> {
    Ok(roc_curve(y_true, scores)?.auc())
}
