use std::collections::BTreeMap;

use serde::Serialize;

use crate::insight_core::{AnomalyScore, Dataset};
use crate::utils::IndexMismatch;

/// One dataset row joined with its score and flag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledRow {
    /// Index of the row in the source table
    pub row_index: usize,
    /// Selected feature values, in feature order
    pub values: Vec<f64>,
    pub score: f64,
    pub is_anomaly: bool,
}

impl AssembledRow {
    pub fn anomaly_score(&self) -> AnomalyScore {
        AnomalyScore {
            row_index: self.row_index,
            score: self.score,
            is_anomaly: self.is_anomaly,
        }
    }
}

/// Join scores and flags back onto the dataset rows
///
/// # Arguments
/// * `dataset` - Rows that were scored
/// * `scores` - Normalized score per row index
/// * `flags` - Anomaly flag per row index
///
/// # Returns
/// * `Ok(rows)` - One entry per dataset row, in dataset order, unfiltered
/// * `Err(IndexMismatch)` - If `scores` or `flags` do not cover exactly the dataset's row indices
pub fn assemble(
    dataset: &Dataset,
    scores: &BTreeMap<usize, f64>,
    flags: &BTreeMap<usize, bool>,
) -> Result<Vec<AssembledRow>, IndexMismatch> {
    if scores.len() != dataset.len() || flags.len() != dataset.len() {
        return Err(IndexMismatch(format!(
            "dataset has {} rows, got {} scores and {} flags",
            dataset.len(),
            scores.len(),
            flags.len()
        )));
    }

    dataset
        .rows()
        .map(|(row_index, values)| {
            let score = scores.get(&row_index).copied();
            let is_anomaly = flags.get(&row_index).copied();
            match (score, is_anomaly) {
                (Some(score), Some(is_anomaly)) => Ok(AssembledRow {
                    row_index,
                    values: values.to_vec(),
                    score,
                    is_anomaly,
                }),
                _ => Err(IndexMismatch(format!("row {} has no score or flag", row_index))),
            }
        })
        .collect()
}
