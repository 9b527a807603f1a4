use std::time::Instant;

use ndarray::ArrayView1;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use super::feature::Dataset;
use super::tree::{max_depth_for, IsolationTree};
use crate::utils::{CancellationToken, DetectionError, DimensionMismatch};

/// Generator for tree `index`: the master seed selects the key, the tree
/// index selects an independent ChaCha stream.
fn tree_rng(seed: u64, index: usize) -> ChaCha20Rng {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    rng
}

/// Ensemble of isolation trees; immutable once trained
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    n_features: usize,
    seed: u64,
}

impl IsolationForest {
    /// Train an isolation forest
    ///
    /// # Arguments
    /// * `dataset` - Rows to learn from (at least 2)
    /// * `n_trees` - Ensemble size (>= 1)
    /// * `sample_size` - Rows drawn without replacement per tree (>= 2); capped at the dataset size
    /// * `seed` - Master seed; tree `i` draws from stream `i`
    /// * `cancel` - Checked before each tree is built
    ///
    /// # Returns
    /// * `Ok(IsolationForest)` - Trained ensemble
    /// * `Err(DetectionError)` - Invalid parameters, too few rows, or cancelled
    ///
    /// # Algorithm
    /// Trees are independent and are built in parallel on the rayon pool that
    /// is current when this is called. Results do not depend on scheduling.
    pub fn train(
        dataset: &Dataset,
        n_trees: usize,
        sample_size: usize,
        seed: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<Self, DetectionError> {
        if n_trees == 0 {
            return Err(DetectionError::InvalidConfig(
                "ensemble_size must be >= 1".to_string(),
            ));
        }
        let n_rows = dataset.len();
        if n_rows < 2 {
            return Err(DetectionError::InsufficientRows { rows: n_rows });
        }
        if sample_size < 2 {
            return Err(DetectionError::InvalidConfig(format!(
                "sub_sample_size must be >= 2, got {}",
                sample_size
            )));
        }

        let sample_size = sample_size.min(n_rows);
        let max_depth = max_depth_for(sample_size);
        let features = dataset.features();

        info!(
            trees = n_trees,
            sample_size,
            max_depth,
            rows = n_rows,
            features = dataset.n_features(),
            "training isolation forest"
        );
        let started = Instant::now();

        let trees = (0..n_trees)
            .into_par_iter()
            .map(|index| {
                if cancel.is_some_and(CancellationToken::is_cancelled) {
                    return Err(DetectionError::Cancelled);
                }
                let mut rng = tree_rng(seed, index);
                let sample: Vec<usize> = if sample_size >= n_rows {
                    (0..n_rows).collect()
                } else {
                    rand::seq::index::sample(&mut rng, n_rows, sample_size).into_vec()
                };
                Ok(IsolationTree::build(features, &sample, max_depth, &mut rng))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "forest built");

        Ok(Self {
            trees,
            sample_size,
            n_features: dataset.n_features(),
            seed,
        })
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Sub-sample size actually used per tree
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Mean path length of `row` across all trees (not normalized)
    pub fn score_raw(&self, row: ArrayView1<'_, f64>) -> Result<f64, DimensionMismatch> {
        if row.len() != self.n_features {
            return Err(DimensionMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        Ok(self.mean_path_length(row))
    }

    /// Raw scores of every dataset row, in dataset order
    pub fn score_dataset(&self, dataset: &Dataset) -> Result<Vec<f64>, DimensionMismatch> {
        if dataset.n_features() != self.n_features {
            return Err(DimensionMismatch {
                expected: self.n_features,
                actual: dataset.n_features(),
            });
        }
        let scores: Vec<f64> = (0..dataset.len())
            .into_par_iter()
            .map(|pos| self.mean_path_length(dataset.row(pos)))
            .collect();
        Ok(scores)
    }

    // Summed in tree order so the result is bit-identical across runs
    fn mean_path_length(&self, row: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|tree| tree.path_length(row)).sum();
        total / self.trees.len() as f64
    }
}
