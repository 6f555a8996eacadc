//! Feature scaling

use crate::error::{AnomalyError, Result};
use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

/// Parameters for a fitted scaler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ScalerParams {
    mean: Array1<f64>,
    variance: Array1<f64>,
    scale: Array1<f64>,
}

/// Standard scaling (z-score normalization): (x - mean) / std
///
/// Statistics use the population variance. Columns with zero variance keep a
/// scale of 1, so they are centered but never divided by zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    params: Option<ScalerParams>,
}

impl StandardScaler {
    /// Create an unfitted scaler
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn per-column mean and variance
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(AnomalyError::InvalidInput(
                "cannot fit a scaler on an empty matrix".to_string(),
            ));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| AnomalyError::InvalidInput("empty matrix".to_string()))?;
        let variance = x.var_axis(Axis(0), 0.0);
        let n = x.nrows() as f64;
        // Variance within rounding error of the column magnitude counts as constant
        let scale = Zip::from(&variance).and(&mean).map_collect(|&v, &m| {
            let bound = n * f64::EPSILON * v + (n * m * f64::EPSILON).powi(2);
            if v > bound { v.sqrt() } else { 1.0 }
        });

        self.params = Some(ScalerParams { mean, variance, scale });
        Ok(self)
    }

    /// Apply the fitted statistics
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.fitted_params(x)?;
        Ok((x - &params.mean) / &params.scale)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(x)?;
        self.transform(x)
    }

    /// Map scaled values back to the original units
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let params = self.fitted_params(x)?;
        Ok(x * &params.scale + &params.mean)
    }

    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.mean.len())
    }

    pub fn mean(&self) -> Option<&Array1<f64>> {
        self.params.as_ref().map(|p| &p.mean)
    }

    pub fn variance(&self) -> Option<&Array1<f64>> {
        self.params.as_ref().map(|p| &p.variance)
    }

    fn fitted_params(&self, x: &Array2<f64>) -> Result<&ScalerParams> {
        let params = self.params.as_ref().ok_or(AnomalyError::ModelNotFitted)?;
        if x.ncols() != params.mean.len() {
            return Err(AnomalyError::ShapeError {
                expected: format!("{} features", params.mean.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(params)
    }
}
