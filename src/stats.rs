use serde::Serialize;

use crate::insight_core::AnomalyScore;

/// Summary of one detection run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Rows scored
    pub count: usize,
    pub anomalies: usize,
    /// `anomalies / count`
    pub anomaly_rate: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Score threshold used for flagging
    pub threshold: f64,
}

impl Statistics {
    /// Compute statistics over normalized scores
    pub fn compute(scores: &[AnomalyScore], threshold: f64) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let count = scores.len();
        let anomalies = scores.iter().filter(|s| s.is_anomaly).count();
        let sum: f64 = scores.iter().map(|s| s.score).sum();
        let min = scores.iter().map(|s| s.score).fold(f64::INFINITY, f64::min);
        let max = scores.iter().map(|s| s.score).fold(f64::NEG_INFINITY, f64::max);

        Some(Statistics {
            count,
            anomalies,
            anomaly_rate: anomalies as f64 / count as f64,
            mean: sum / count as f64,
            min,
            max,
            threshold,
        })
    }
}
