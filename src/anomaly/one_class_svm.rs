//! One-Class SVM anomaly detection
//!
//! ν-formulation solved with SMO (second-order working set selection) on the
//! dual problem
//!
//! ```text
//! min ½ αᵀQα   s.t.  0 ≤ αᵢ ≤ 1,  Σαᵢ = ν·l
//! ```
//!
//! Kernel rows are computed on demand and kept in a bounded cache, so memory
//! stays proportional to `cache_size_mb` instead of l².

use crate::anomaly::{check_n_features, check_training_data, AnomalyDetector, DetectorParams, ScoreOrientation};
use crate::error::{AnomalyError, Result};
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Floor for the second-order curvature term
const TAU: f64 = 1e-12;

/// Kernel function type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    /// K(x, y) = exp(-γ‖x − y‖²)
    Rbf,
    /// K(x, y) = x · y
    Linear,
    /// K(x, y) = (γ x · y + r)^d
    Poly,
    /// K(x, y) = tanh(γ x · y + r)
    Sigmoid,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::Rbf
    }
}

/// Kernel coefficient γ
///
/// Written as `"scale"`, `"auto"` or a number in JSON configs; binary formats
/// use a plain tagged encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// 1 / (n_features · Var(X))
    Scale,
    /// 1 / n_features
    Auto,
    /// Fixed positive value
    Value(f64),
}

impl Default for Gamma {
    fn default() -> Self {
        Gamma::Scale
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GammaRepr {
    Named(String),
    Value(f64),
}

#[derive(Serialize, Deserialize)]
enum GammaTagged {
    Scale,
    Auto,
    Value(f64),
}

impl TryFrom<GammaRepr> for Gamma {
    type Error = String;

    fn try_from(repr: GammaRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            GammaRepr::Named(name) => match name.as_str() {
                "scale" => Ok(Gamma::Scale),
                "auto" => Ok(Gamma::Auto),
                other => Err(format!("unknown gamma '{}', expected 'scale', 'auto' or a number", other)),
            },
            GammaRepr::Value(v) => Ok(Gamma::Value(v)),
        }
    }
}

impl Serialize for Gamma {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let repr = match *self {
                Gamma::Scale => GammaRepr::Named("scale".to_string()),
                Gamma::Auto => GammaRepr::Named("auto".to_string()),
                Gamma::Value(v) => GammaRepr::Value(v),
            };
            repr.serialize(serializer)
        } else {
            let tagged = match *self {
                Gamma::Scale => GammaTagged::Scale,
                Gamma::Auto => GammaTagged::Auto,
                Gamma::Value(v) => GammaTagged::Value(v),
            };
            tagged.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Gamma {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            Gamma::try_from(GammaRepr::deserialize(deserializer)?).map_err(D::Error::custom)
        } else {
            Ok(match GammaTagged::deserialize(deserializer)? {
                GammaTagged::Scale => Gamma::Scale,
                GammaTagged::Auto => Gamma::Auto,
                GammaTagged::Value(v) => Gamma::Value(v),
            })
        }
    }
}

/// One-Class SVM hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OneClassSvmParams {
    /// Upper bound on the training outlier fraction and lower bound on the
    /// support vector fraction
    pub nu: f64,
    /// Kernel function
    pub kernel: Kernel,
    /// Kernel coefficient for rbf, poly and sigmoid
    pub gamma: Gamma,
    /// Polynomial degree
    pub degree: u32,
    /// Independent term for poly and sigmoid
    pub coef0: f64,
    /// Stopping tolerance on the maximal KKT violation
    pub tol: f64,
    /// Maximum SMO iterations
    pub max_iter: usize,
    /// Kernel row cache budget in megabytes
    pub cache_size_mb: usize,
}

impl Default for OneClassSvmParams {
    fn default() -> Self {
        Self {
            nu: 0.1,
            kernel: Kernel::Rbf,
            gamma: Gamma::Scale,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: 100_000,
            cache_size_mb: 200,
        }
    }
}

impl OneClassSvmParams {
    pub fn with_nu(mut self, nu: f64) -> Self {
        self.nu = nu;
        self
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_gamma(mut self, gamma: Gamma) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Parse from a key-value record, rejecting unknown keys
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let params: Self = serde_json::from_value(value)
            .map_err(|e| AnomalyError::ConfigError(format!("one_class_svm: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.nu > 0.0 && self.nu <= 1.0) {
            return Err(AnomalyError::ConfigError(format!(
                "one_class_svm.nu must be in (0, 1], got {}",
                self.nu
            )));
        }
        if let Gamma::Value(g) = self.gamma {
            if !(g > 0.0 && g.is_finite()) {
                return Err(AnomalyError::ConfigError(format!(
                    "one_class_svm.gamma must be positive, got {}",
                    g
                )));
            }
        }
        if !(self.tol > 0.0) {
            return Err(AnomalyError::ConfigError("one_class_svm.tol must be positive".to_string()));
        }
        if self.max_iter == 0 {
            return Err(AnomalyError::ConfigError("one_class_svm.max_iter must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Kernel with γ resolved against the training data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct KernelFn {
    kernel: Kernel,
    gamma: f64,
    degree: u32,
    coef0: f64,
}

impl KernelFn {
    fn resolve(params: &OneClassSvmParams, x: &Array2<f64>) -> Self {
        let n_features = x.ncols() as f64;
        let gamma = match params.gamma {
            Gamma::Value(g) => g,
            Gamma::Auto => 1.0 / n_features,
            Gamma::Scale => {
                let var = x.var(0.0);
                if var > 0.0 { 1.0 / (n_features * var) } else { 1.0 }
            }
        };
        Self {
            kernel: params.kernel,
            gamma,
            degree: params.degree,
            coef0: params.coef0,
        }
    }

    fn eval(&self, a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
        match self.kernel {
            Kernel::Linear => a.dot(b),
            Kernel::Poly => (self.gamma * a.dot(b) + self.coef0).powi(self.degree as i32),
            Kernel::Rbf => {
                let sq_dist: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v) * (u - v)).sum();
                (-self.gamma * sq_dist).exp()
            }
            Kernel::Sigmoid => (self.gamma * a.dot(b) + self.coef0).tanh(),
        }
    }
}

/// Bounded cache of kernel matrix rows, evicting the least recently used row
struct KernelCache<'a> {
    x: &'a Array2<f64>,
    kernel: KernelFn,
    rows: HashMap<usize, Arc<Vec<f64>>>,
    order: VecDeque<usize>,
    capacity: usize,
}

impl<'a> KernelCache<'a> {
    fn new(x: &'a Array2<f64>, kernel: KernelFn, cache_size_mb: usize) -> Self {
        let row_bytes = x.nrows().max(1) * std::mem::size_of::<f64>();
        let capacity = (cache_size_mb * 1024 * 1024 / row_bytes).max(2);
        Self {
            x,
            kernel,
            rows: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn row(&mut self, i: usize) -> Arc<Vec<f64>> {
        if let Some(row) = self.rows.get(&i) {
            let row = Arc::clone(row);
            if let Some(pos) = self.order.iter().position(|&k| k == i) {
                self.order.remove(pos);
                self.order.push_back(i);
            }
            return row;
        }

        let xi = self.x.row(i);
        let kernel = self.kernel;
        let values: Vec<f64> = self
            .x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|xj| kernel.eval(&xi, &xj))
            .collect();
        let row = Arc::new(values);

        if self.rows.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.rows.remove(&evicted);
            }
        }
        self.rows.insert(i, Arc::clone(&row));
        self.order.push_back(i);
        row
    }
}

/// Output of the SMO solver
struct Solution {
    alpha: Vec<f64>,
    rho: f64,
    n_iter: usize,
    converged: bool,
}

fn solve_smo(x: &Array2<f64>, kernel: KernelFn, params: &OneClassSvmParams) -> Solution {
    let l = x.nrows();
    let mut cache = KernelCache::new(x, kernel, params.cache_size_mb);
    let diag: Vec<f64> = x.axis_iter(Axis(0)).map(|r| kernel.eval(&r, &r)).collect();

    // Feasible start: the first ⌊νl⌋ multipliers at the upper bound
    let target = params.nu * l as f64;
    let n_full = (target.floor() as usize).min(l);
    let mut alpha = vec![0.0; l];
    for a in alpha.iter_mut().take(n_full) {
        *a = 1.0;
    }
    if n_full < l {
        alpha[n_full] = target - n_full as f64;
    }

    // G = Qα
    let mut grad = vec![0.0; l];
    for j in 0..l {
        if alpha[j] > 0.0 {
            let q_j = cache.row(j);
            for (g, q) in grad.iter_mut().zip(q_j.iter()) {
                *g += alpha[j] * q;
            }
        }
    }

    let mut n_iter = 0;
    let mut converged = false;

    while n_iter < params.max_iter {
        // i: steepest feasible ascent among multipliers that can still grow
        let mut g_max = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..l {
            if alpha[t] < 1.0 && -grad[t] >= g_max {
                g_max = -grad[t];
                i_sel = Some(t);
            }
        }
        let Some(i) = i_sel else {
            converged = true;
            break;
        };

        // j: second-order choice among multipliers that can shrink
        let q_i = cache.row(i);
        let mut g_max2 = f64::NEG_INFINITY;
        let mut j_sel = None;
        let mut obj_diff_min = f64::INFINITY;
        for t in 0..l {
            if alpha[t] > 0.0 {
                let grad_diff = g_max + grad[t];
                if grad[t] >= g_max2 {
                    g_max2 = grad[t];
                }
                if grad_diff > 0.0 {
                    let quad = diag[i] + diag[t] - 2.0 * q_i[t];
                    let obj_diff = -(grad_diff * grad_diff) / if quad > 0.0 { quad } else { TAU };
                    if obj_diff <= obj_diff_min {
                        obj_diff_min = obj_diff;
                        j_sel = Some(t);
                    }
                }
            }
        }

        if g_max + g_max2 < params.tol {
            converged = true;
            break;
        }
        let Some(j) = j_sel else {
            converged = true;
            break;
        };

        n_iter += 1;

        let q_j = cache.row(j);
        let old_ai = alpha[i];
        let old_aj = alpha[j];

        let mut quad = diag[i] + diag[j] - 2.0 * q_i[j];
        if quad <= 0.0 {
            quad = TAU;
        }
        let delta = (grad[i] - grad[j]) / quad;
        let sum = alpha[i] + alpha[j];
        alpha[i] -= delta;
        alpha[j] += delta;

        if sum > 1.0 {
            if alpha[i] > 1.0 {
                alpha[i] = 1.0;
                alpha[j] = sum - 1.0;
            }
        } else if alpha[j] < 0.0 {
            alpha[j] = 0.0;
            alpha[i] = sum;
        }
        if sum > 1.0 {
            if alpha[j] > 1.0 {
                alpha[j] = 1.0;
                alpha[i] = sum - 1.0;
            }
        } else if alpha[i] < 0.0 {
            alpha[i] = 0.0;
            alpha[j] = sum;
        }

        let d_ai = alpha[i] - old_ai;
        let d_aj = alpha[j] - old_aj;
        for t in 0..l {
            grad[t] += q_i[t] * d_ai + q_j[t] * d_aj;
        }
    }

    Solution {
        rho: compute_rho(&alpha, &grad),
        alpha,
        n_iter,
        converged,
    }
}

/// ρ from the KKT conditions: mean gradient over free multipliers, or the
/// midpoint of the feasible interval when every multiplier sits at a bound
fn compute_rho(alpha: &[f64], grad: &[f64]) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut n_free = 0usize;
    let mut sum_free = 0.0;

    for (&a, &g) in alpha.iter().zip(grad.iter()) {
        if a >= 1.0 {
            lb = lb.max(g);
        } else if a <= 0.0 {
            ub = ub.min(g);
        } else {
            n_free += 1;
            sum_free += g;
        }
    }

    if n_free > 0 {
        sum_free / n_free as f64
    } else if ub.is_finite() && lb.is_finite() {
        (ub + lb) / 2.0
    } else if lb.is_finite() {
        lb
    } else {
        ub
    }
}

/// Fitted decision function
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SvmModel {
    support_vectors: Array2<f64>,
    dual_coef: Array1<f64>,
    rho: f64,
    kernel: KernelFn,
    n_rows: usize,
}

/// One-Class SVM anomaly detector
///
/// Native score: `decision_function = Σ αᵢ K(svᵢ, x) − ρ`, positive inside the
/// learned boundary. Expects to be fitted on normal rows only; the detector
/// itself does not check labels.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneClassSvm {
    params: OneClassSvmParams,
    model: Option<SvmModel>,
}

impl OneClassSvm {
    /// Create an untrained detector
    pub fn new(params: OneClassSvmParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, model: None })
    }

    /// Number of support vectors (available after fit)
    pub fn n_support(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.support_vectors.nrows())
    }

    /// Resolved kernel coefficient (available after fit)
    pub fn fitted_gamma(&self) -> Option<f64> {
        self.model.as_ref().map(|m| m.kernel.gamma)
    }
}

impl AnomalyDetector for OneClassSvm {
    fn name(&self) -> &'static str {
        "one_class_svm"
    }

    fn fit(&mut self, x: &Array2<f64>) -> Result<()> {
        check_training_data(x)?;
        let kernel = KernelFn::resolve(&self.params, x);
        let solution = solve_smo(x, kernel, &self.params);

        if !solution.converged {
            warn!(
                max_iter = self.params.max_iter,
                "One-class SVM solver hit the iteration limit before converging"
            );
        }

        let support: Vec<usize> = solution
            .alpha
            .iter()
            .enumerate()
            .filter(|(_, &a)| a > 0.0)
            .map(|(i, _)| i)
            .collect();

        let support_vectors = x.select(Axis(0), &support);
        let dual_coef: Array1<f64> = support.iter().map(|&i| solution.alpha[i]).collect();

        debug!(
            n_rows = x.nrows(),
            n_support = support.len(),
            n_iter = solution.n_iter,
            rho = solution.rho,
            gamma = kernel.gamma,
            "One-class SVM fitted"
        );

        self.model = Some(SvmModel {
            support_vectors,
            dual_coef,
            rho: solution.rho,
            kernel,
            n_rows: x.nrows(),
        });
        Ok(())
    }

    fn n_training_rows(&self) -> Option<usize> {
        self.model.as_ref().map(|m| m.n_rows)
    }

    fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let model = self.model.as_ref().ok_or(AnomalyError::ModelNotFitted)?;
        check_n_features(model.support_vectors.ncols(), x)?;

        let values: Vec<f64> = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| {
                let acc: f64 = model
                    .support_vectors
                    .axis_iter(Axis(0))
                    .zip(model.dual_coef.iter())
                    .map(|(sv, &coef)| coef * model.kernel.eval(&sv, &row))
                    .sum();
                acc - model.rho
            })
            .collect();

        Ok(Array1::from_vec(values))
    }

    fn score_orientation(&self) -> ScoreOrientation {
        ScoreOrientation::HigherIsNormal
    }

    fn get_params(&self) -> DetectorParams {
        DetectorParams::OneClassSvm(self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::prelude::*;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn gaussian_blob(n: usize, d: usize, center: f64, seed: u64) -> Array2<f64> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        // Sum of uniforms is close enough to normal for these tests
        Array2::from_shape_fn((n, d), |_| {
            center + (0..6).map(|_| rng.gen::<f64>() - 0.5).sum::<f64>()
        })
    }

    #[test]
    fn test_outliers_score_below_boundary() {
        let normal = gaussian_blob(200, 3, 0.0, 1);
        let mut svm = OneClassSvm::new(OneClassSvmParams::default()).unwrap();
        svm.fit(&normal).unwrap();

        let probe = array![[0.0, 0.0, 0.0], [8.0, 8.0, 8.0], [-6.0, 7.0, -6.0]];
        let decision = svm.decision_function(&probe).unwrap();
        assert!(decision[0] > 0.0, "center should be an inlier: {}", decision[0]);
        assert!(decision[1] < 0.0);
        assert!(decision[2] < 0.0);

        let labels = svm.predict(&probe).unwrap();
        assert_eq!(labels, array![0u8, 1, 1]);

        // Anomaly scores flip the native sign
        let scores = svm.anomaly_scores(&probe).unwrap();
        assert!(scores[1] > scores[0]);
        assert_eq!(scores[0], -decision[0]);
    }

    #[test]
    fn test_nu_bounds_training_outlier_fraction() {
        let normal = gaussian_blob(300, 2, 0.0, 7);
        let nu = 0.1;
        let mut svm = OneClassSvm::new(OneClassSvmParams::default().with_nu(nu)).unwrap();
        svm.fit(&normal).unwrap();

        let flagged = svm.predict(&normal).unwrap().iter().filter(|&&l| l == 1).count();
        let fraction = flagged as f64 / 300.0;
        assert!(fraction <= nu + 0.05, "training outlier fraction {}", fraction);

        // At least ν·l support vectors
        assert!(svm.n_support().unwrap() as f64 >= nu * 300.0 - 1.0);
    }

    #[test]
    fn test_dual_constraints_hold() {
        let x = gaussian_blob(120, 2, 0.0, 3);
        let params = OneClassSvmParams::default().with_nu(0.2);
        let kernel = KernelFn::resolve(&params, &x);
        let solution = solve_smo(&x, kernel, &params);

        assert!(solution.converged);
        let sum: f64 = solution.alpha.iter().sum();
        assert!((sum - 0.2 * 120.0).abs() < 1e-8, "sum of alphas {}", sum);
        assert!(solution.alpha.iter().all(|&a| (0.0..=1.0).contains(&a)));
    }

    #[test]
    fn test_kernels() {
        let x = gaussian_blob(80, 2, 0.0, 11);
        for kernel in [Kernel::Rbf, Kernel::Linear, Kernel::Poly, Kernel::Sigmoid] {
            let mut svm = OneClassSvm::new(OneClassSvmParams::default().with_kernel(kernel)).unwrap();
            svm.fit(&x).unwrap();
            let decision = svm.decision_function(&x).unwrap();
            assert_eq!(decision.len(), 80);
            assert!(decision.iter().all(|v| v.is_finite()), "{:?}", kernel);
        }
    }

    #[test]
    fn test_gamma_resolution() {
        let x = array![[0.0, 2.0], [2.0, 0.0]];
        // Var of [0, 2, 2, 0] is 1
        let scale = KernelFn::resolve(&OneClassSvmParams::default(), &x);
        assert!((scale.gamma - 0.5).abs() < 1e-12);

        let auto = KernelFn::resolve(&OneClassSvmParams::default().with_gamma(Gamma::Auto), &x);
        assert!((auto.gamma - 0.5).abs() < 1e-12);

        let constant = array![[1.0, 1.0], [1.0, 1.0]];
        let fallback = KernelFn::resolve(&OneClassSvmParams::default(), &constant);
        assert_eq!(fallback.gamma, 1.0);
    }

    #[test]
    fn test_small_cache_matches_large_cache() {
        let x = gaussian_blob(150, 2, 0.0, 5);
        let mut big = OneClassSvm::new(OneClassSvmParams::default()).unwrap();
        let mut small = OneClassSvm::new(OneClassSvmParams {
            cache_size_mb: 0,
            ..OneClassSvmParams::default()
        })
        .unwrap();
        big.fit(&x).unwrap();
        small.fit(&x).unwrap();
        assert_eq!(big.decision_function(&x).unwrap(), small.decision_function(&x).unwrap());
    }

    #[test]
    fn test_kernel_cache_evicts_least_recent() {
        let x = gaussian_blob(10, 2, 0.0, 9);
        let kernel = KernelFn::resolve(&OneClassSvmParams::default(), &x);
        let mut cache = KernelCache::new(&x, kernel, 0);
        assert_eq!(cache.capacity, 2);

        cache.row(0);
        cache.row(1);
        cache.row(0);
        cache.row(2);
        assert!(cache.rows.contains_key(&0));
        assert!(!cache.rows.contains_key(&1));
        assert!((cache.row(2)[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_params_from_value() {
        let params = OneClassSvmParams::from_value(serde_json::json!({
            "nu": 0.05,
            "kernel": "linear",
            "gamma": 0.3
        }))
        .unwrap();
        assert_eq!(params.kernel, Kernel::Linear);
        assert_eq!(params.gamma, Gamma::Value(0.3));

        let params = OneClassSvmParams::from_value(serde_json::json!({ "gamma": "auto" })).unwrap();
        assert_eq!(params.gamma, Gamma::Auto);

        assert!(OneClassSvmParams::from_value(serde_json::json!({ "nu": 0.1, "C": 1.0 })).is_err());
        assert!(OneClassSvmParams::from_value(serde_json::json!({ "kernel": "laplace" })).is_err());
        assert!(OneClassSvmParams::from_value(serde_json::json!({ "gamma": "wide" })).is_err());
        assert!(OneClassSvmParams::from_value(serde_json::json!({ "nu": 1.5 })).is_err());
    }

    #[test]
    fn test_gamma_binary_encoding() {
        for gamma in [Gamma::Scale, Gamma::Auto, Gamma::Value(0.25)] {
            let bytes = bincode::serialize(&gamma).unwrap();
            let back: Gamma = bincode::deserialize(&bytes).unwrap();
            assert_eq!(back, gamma);
        }
        assert_eq!(serde_json::to_string(&Gamma::Scale).unwrap(), "\"scale\"");
        assert_eq!(serde_json::to_string(&Gamma::Value(0.5)).unwrap(), "0.5");
    }
}
