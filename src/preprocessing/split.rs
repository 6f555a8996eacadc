//! Seeded train/test partitioning

use super::config::SplitConfig;
use crate::error::{AnomalyError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Disjoint train and test partitions of a labeled matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<u8>,
    pub y_test: Array1<u8>,
    /// Original row indices of the training partition
    pub train_indices: Vec<usize>,
    /// Original row indices of the test partition
    pub test_indices: Vec<usize>,
}

impl TrainTestSplit {
    /// Training rows whose label is 0
    pub fn normal_training_rows(&self) -> Array2<f64> {
        let normal: Vec<usize> = self
            .y_train
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == 0)
            .map(|(i, _)| i)
            .collect();
        self.x_train.select(Axis(0), &normal)
    }
}

/// Number of rows assigned to the test partition
pub fn test_count(n_samples: usize, test_size: f64) -> usize {
    (test_size * n_samples as f64).ceil() as usize
}

/// Partition rows into train and test sets
///
/// The same seed always produces the same partition. With stratification,
/// each class's test count is within one row of its exact proportional share.
pub fn train_test_split(
    x: &Array2<f64>,
    y: &Array1<u8>,
    config: &SplitConfig,
) -> Result<TrainTestSplit> {
    config.validate()?;

    let n = x.nrows();
    if y.len() != n {
        return Err(AnomalyError::ShapeError {
            expected: format!("{} labels", n),
            actual: format!("{} labels", y.len()),
        });
    }

    let n_test = test_count(n, config.test_size);
    if n_test == 0 || n_test >= n {
        return Err(AnomalyError::InvalidInput(format!(
            "test_size {} leaves an empty partition for {} rows",
            config.test_size, n
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(config.random_state);

    let (mut train_indices, mut test_indices) = if config.stratify {
        stratified_indices(y, n_test, &mut rng)?
    } else {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let train = indices.split_off(n_test);
        (train, indices)
    };

    train_indices.shuffle(&mut rng);
    test_indices.shuffle(&mut rng);

    debug!(
        train = train_indices.len(),
        test = test_indices.len(),
        stratify = config.stratify,
        "Split dataset"
    );

    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), &train_indices),
        x_test: x.select(Axis(0), &test_indices),
        y_train: y.select(Axis(0), &train_indices),
        y_test: y.select(Axis(0), &test_indices),
        train_indices,
        test_indices,
    })
}

fn stratified_indices(
    y: &Array1<u8>,
    n_test: usize,
    rng: &mut ChaCha8Rng,
) -> Result<(Vec<usize>, Vec<usize>)> {
    // Group indices by class label
    let mut class_indices: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        class_indices.entry(label).or_default().push(i);
    }

    if let Some((label, members)) = class_indices.iter().find(|(_, m)| m.len() < 2) {
        return Err(AnomalyError::StratificationError(format!(
            "class {} has {} member(s); at least 2 are needed to appear in both partitions",
            label,
            members.len()
        )));
    }

    let counts: Vec<usize> = class_indices.values().map(Vec::len).collect();
    let allocation = allocate_test_counts(&counts, n_test)?;

    let mut train = Vec::with_capacity(y.len() - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (members, &k) in class_indices.values().zip(&allocation) {
        let mut members = members.clone();
        members.shuffle(rng);
        test.extend_from_slice(&members[..k]);
        train.extend_from_slice(&members[k..]);
    }

    Ok((train, test))
}

/// Largest-remainder apportionment of `n_test` rows across classes,
/// keeping at least one row of every class on each side
fn allocate_test_counts(counts: &[usize], n_test: usize) -> Result<Vec<usize>> {
    let n: usize = counts.iter().sum();
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| n_test as f64 * c as f64 / n as f64)
        .collect();

    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let assigned: usize = alloc.iter().sum();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(counts[b].cmp(&counts[a]))
    });
    for &k in order.iter().take(n_test.saturating_sub(assigned)) {
        alloc[k] += 1;
    }

    for (k, a) in alloc.iter_mut().enumerate() {
        *a = (*a).clamp(1, counts[k] - 1);
    }

    // Clamping may move the total; rebalance within each class's floor/ceil
    loop {
        let total: usize = alloc.iter().sum();
        if total == n_test {
            return Ok(alloc);
        }

        let candidate = if total > n_test {
            (0..alloc.len())
                .filter(|&k| alloc[k] > 1 && alloc[k] as f64 > exact[k].floor())
                .max_by(|&a, &b| (alloc[a] as f64 - exact[a]).total_cmp(&(alloc[b] as f64 - exact[b])))
        } else {
            (0..alloc.len())
                .filter(|&k| alloc[k] < counts[k] - 1 && (alloc[k] as f64) < exact[k].ceil())
                .max_by(|&a, &b| (exact[a] - alloc[a] as f64).total_cmp(&(exact[b] - alloc[b] as f64)))
        };

        match candidate {
            Some(k) if total > n_test => alloc[k] -= 1,
            Some(k) => alloc[k] += 1,
            None => {
                return Err(AnomalyError::StratificationError(format!(
                    "cannot place {} test rows across class sizes {:?} with every class in both partitions",
                    n_test, counts
                )))
            }
        }
    }
}
