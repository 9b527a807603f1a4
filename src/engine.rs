use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::export::{assemble, AssembledRow};
use crate::insight_core::threshold::validate_sensitivity;
use crate::insight_core::{classify, normalize, AnomalyScore, Dataset, IsolationForest};
use crate::stats::Statistics;
use crate::utils::{CancellationToken, DetectionError};

/// Trees in the ensemble unless configured otherwise
pub const DEFAULT_ENSEMBLE_SIZE: usize = 100;
/// Sub-sample size cap; the default is `min(256, rows)`
pub const DEFAULT_MAX_SUB_SAMPLE_SIZE: usize = 256;
pub const DEFAULT_SENSITIVITY: f64 = 0.1;

/// Detection settings; every field is optional in a JSON config file
///
/// | Field             | Default          |
/// |-------------------|------------------|
/// | `ensemble_size`   | 100              |
/// | `sub_sample_size` | `min(256, rows)` |
/// | `sensitivity`     | 0.1              |
/// | `seed`            | random           |
/// | `max_threads`     | rayon default    |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    pub ensemble_size: usize,
    pub sub_sample_size: Option<usize>,
    /// Higher flags more rows; clamped to (0, 0.5] as the contamination fraction
    pub sensitivity: f64,
    pub seed: Option<u64>,
    pub max_threads: Option<usize>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            ensemble_size: DEFAULT_ENSEMBLE_SIZE,
            sub_sample_size: None,
            sensitivity: DEFAULT_SENSITIVITY,
            seed: None,
            max_threads: None,
        }
    }
}

impl DetectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ensemble_size(mut self, ensemble_size: usize) -> Self {
        self.ensemble_size = ensemble_size;
        self
    }

    pub fn with_sub_sample_size(mut self, sub_sample_size: usize) -> Self {
        self.sub_sample_size = Some(sub_sample_size);
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Set the random seed for reproducibility
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build and score on a dedicated pool of `threads` workers
    pub fn with_max_threads(mut self, threads: usize) -> Self {
        self.max_threads = Some(threads);
        self
    }

    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.ensemble_size == 0 {
            return Err(DetectionError::InvalidConfig(
                "ensemble_size must be >= 1".to_string(),
            ));
        }
        if let Some(size) = self.sub_sample_size.filter(|&s| s < 2) {
            return Err(DetectionError::InvalidConfig(format!(
                "sub_sample_size must be >= 2, got {}",
                size
            )));
        }
        if self.max_threads == Some(0) {
            return Err(DetectionError::InvalidConfig(
                "max_threads must be >= 1".to_string(),
            ));
        }
        validate_sensitivity(self.sensitivity)
    }

    /// Sub-sample size for a dataset of `rows` rows
    pub fn sub_sample_size_for(&self, rows: usize) -> usize {
        self.sub_sample_size
            .unwrap_or_else(|| DEFAULT_MAX_SUB_SAMPLE_SIZE.min(rows))
    }
}

/// Outcome of one detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    /// One entry per dataset row, in dataset order
    pub rows: Vec<AssembledRow>,
    pub threshold: f64,
    pub contamination: f64,
    /// Master seed actually used; pass it back to reproduce the run
    pub seed: u64,
    pub n_trees: usize,
    pub sample_size: usize,
    pub summary: Statistics,
}

impl Detection {
    pub fn scores(&self) -> Vec<AnomalyScore> {
        self.rows.iter().map(AssembledRow::anomaly_score).collect()
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &AssembledRow> {
        self.rows.iter().filter(|r| r.is_anomaly)
    }
}

/// Runs isolation-forest detection with a fixed configuration
#[derive(Debug, Clone)]
pub struct AnomalyEngine {
    config: DetectionConfig,
}

impl AnomalyEngine {
    /// Create an engine, rejecting invalid configuration up front
    pub fn new(config: DetectionConfig) -> Result<Self, DetectionError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Train a forest on `dataset` with the configured ensemble and sub-sample sizes
    pub fn fit(&self, dataset: &Dataset, seed: u64) -> Result<IsolationForest, DetectionError> {
        self.in_pool(|| self.train(dataset, seed, None))
    }

    /// Score and flag every row of `dataset`
    pub fn detect(&self, dataset: &Dataset) -> Result<Detection, DetectionError> {
        self.in_pool(|| self.run(dataset, None))
    }

    /// Like [`detect`](Self::detect), stopping between trees once `cancel` fires
    pub fn detect_with_cancel(
        &self,
        dataset: &Dataset,
        cancel: &CancellationToken,
    ) -> Result<Detection, DetectionError> {
        self.in_pool(|| self.run(dataset, Some(cancel)))
    }

    fn in_pool<T, F>(&self, work: F) -> Result<T, DetectionError>
    where
        T: Send,
        F: FnOnce() -> Result<T, DetectionError> + Send,
    {
        match self.config.max_threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| DetectionError::ThreadPool(e.to_string()))?
                .install(work),
            None => work(),
        }
    }

    fn train(
        &self,
        dataset: &Dataset,
        seed: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<IsolationForest, DetectionError> {
        IsolationForest::train(
            dataset,
            self.config.ensemble_size,
            self.config.sub_sample_size_for(dataset.len()),
            seed,
            cancel,
        )
    }

    fn run(
        &self,
        dataset: &Dataset,
        cancel: Option<&CancellationToken>,
    ) -> Result<Detection, DetectionError> {
        let seed = self.config.seed.unwrap_or_else(rand::random);
        debug!(seed, explicit = self.config.seed.is_some(), "master seed");

        let forest = self.train(dataset, seed, cancel)?;
        let raw = forest.score_dataset(dataset)?;

        let normalized: Vec<f64> = raw
            .iter()
            .map(|&r| normalize(r, forest.sample_size()))
            .collect();
        let scores: BTreeMap<usize, f64> = dataset
            .row_indices()
            .iter()
            .copied()
            .zip(normalized)
            .collect();
        let (threshold, flags) = classify(&scores, self.config.sensitivity)
            .ok_or(DetectionError::InsufficientRows { rows: 0 })?;

        let rows = assemble(dataset, &scores, &flags)?;
        let anomaly_scores: Vec<AnomalyScore> = rows.iter().map(AssembledRow::anomaly_score).collect();
        let summary = Statistics::compute(&anomaly_scores, threshold.value)
            .ok_or(DetectionError::InsufficientRows { rows: 0 })?;

        info!(
            rows = summary.count,
            anomalies = summary.anomalies,
            threshold = threshold.value,
            contamination = threshold.contamination,
            "detection complete"
        );

        Ok(Detection {
            rows,
            threshold: threshold.value,
            contamination: threshold.contamination,
            seed,
            n_trees: forest.n_trees(),
            sample_size: forest.sample_size(),
            summary,
        })
    }
}

/// Score and flag every row of `dataset` in one call
///
/// # Arguments
/// * `ensemble_size` - Number of trees (>= 1)
/// * `sub_sample_size` - Rows per tree (>= 2); `None` uses `min(256, rows)`
/// * `sensitivity` - In [0, 1]; clamped to (0, 0.5] as the flagged fraction
/// * `seed` - Master seed; `None` draws one at random
pub fn detect(
    dataset: &Dataset,
    ensemble_size: usize,
    sub_sample_size: Option<usize>,
    sensitivity: f64,
    seed: Option<u64>,
) -> Result<Vec<AnomalyScore>, DetectionError> {
    let config = DetectionConfig {
        ensemble_size,
        sub_sample_size,
        sensitivity,
        seed,
        max_threads: None,
    };
    let detection = AnomalyEngine::new(config)?.detect(dataset)?;
    Ok(detection.scores())
}
