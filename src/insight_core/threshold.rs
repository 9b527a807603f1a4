//! Score normalization and the sensitivity-driven decision threshold

use std::collections::BTreeMap;

use serde::Serialize;

use super::tree::average_path_length;
use crate::utils::DetectionError;

/// Upper bound on the flagged fraction
pub const MAX_CONTAMINATION: f64 = 0.5;

/// Lower bound on the flagged fraction; keeps the quantile inside the data
pub const MIN_CONTAMINATION: f64 = 1e-6;

/// Validate sensitivity is finite and within [0, 1]
pub fn validate_sensitivity(sensitivity: f64) -> Result<(), DetectionError> {
    if !(0.0..=1.0).contains(&sensitivity) {
        return Err(DetectionError::InvalidConfig(format!(
            "sensitivity must be 0-1, got {}",
            sensitivity
        )));
    }
    Ok(())
}

/// Contamination fraction for a sensitivity: pass-through clamped to (0, 0.5]
pub fn contamination(sensitivity: f64) -> f64 {
    sensitivity.clamp(MIN_CONTAMINATION, MAX_CONTAMINATION)
}

/// Normalize a mean path length to an anomaly score: `2^(-raw / c(sample_size))`.
///
/// Close to 1 means a strong anomaly; around 0.5 or below is normal.
/// A `sample_size` below 2 has no reference path length and yields 0.5.
pub fn normalize(raw: f64, sample_size: usize) -> f64 {
    let reference = average_path_length(sample_size);
    if reference <= 0.0 {
        return 0.5;
    }
    2f64.powf(-raw / reference)
}

/// Quantile `q` of ascending `sorted` values, linearly interpolating between
/// order statistics: `h = (n - 1) * q`, `x[⌊h⌋] + (h - ⌊h⌋) * (x[⌊h⌋ + 1] - x[⌊h⌋])`
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lower = h.floor() as usize;
    let upper = (lower + 1).min(sorted.len() - 1);
    let fraction = h - lower as f64;
    Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
}

/// Normalized score and flag of one dataset row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AnomalyScore {
    /// Index of the row in the source table
    pub row_index: usize,
    pub score: f64,
    pub is_anomaly: bool,
}

/// Decision threshold fitted to one batch of normalized scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    /// Fraction of rows the threshold aims to flag
    pub contamination: f64,
    /// The `(1 - contamination)` quantile of the scores
    pub value: f64,
    /// Whether scores equal to `value` are flagged
    pub include_ties: bool,
}

impl Threshold {
    /// Fit the threshold for `scores` at the given sensitivity.
    ///
    /// Scores above the quantile are always flagged. Scores equal to it are
    /// flagged only while the flagged count stays within `⌊p * n⌋` and the
    /// strictly-greater rows alone fall short of it. On distinct scores this
    /// drops a row sitting exactly on the quantile, keeping the flag count
    /// at or below `⌊p * n⌋`. Returns `None` for an empty batch.
    pub fn fit(scores: &[f64], sensitivity: f64) -> Option<Self> {
        let p = contamination(sensitivity);
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        let value = quantile(&sorted, 1.0 - p)?;

        let budget = (p * sorted.len() as f64 + 1e-9).floor() as usize;
        let above = sorted.iter().filter(|&&s| s > value).count();
        let ties = sorted.iter().filter(|&&s| s == value).count();

        Some(Self {
            contamination: p,
            value,
            include_ties: above < budget && above + ties <= budget,
        })
    }

    pub fn is_anomaly(&self, score: f64) -> bool {
        score > self.value || (self.include_ties && score == self.value)
    }
}

/// Fit a threshold to `scores` (row index -> normalized score) and flag each row
///
/// Returns `None` when there are no scores.
pub fn classify(
    scores: &BTreeMap<usize, f64>,
    sensitivity: f64,
) -> Option<(Threshold, BTreeMap<usize, bool>)> {
    let values: Vec<f64> = scores.values().copied().collect();
    let threshold = Threshold::fit(&values, sensitivity)?;
    let flags = scores
        .iter()
        .map(|(&index, &score)| (index, threshold.is_anomaly(score)))
        .collect();
    Some((threshold, flags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn indexed(scores: &[f64]) -> BTreeMap<usize, f64> {
        scores.iter().copied().enumerate().collect()
    }

    fn flags_for(scores: &BTreeMap<usize, f64>, sensitivity: f64) -> BTreeMap<usize, bool> {
        classify(scores, sensitivity).unwrap().1
    }

    #[test]
    fn test_validate_sensitivity() {
        assert!(validate_sensitivity(0.0).is_ok());
        assert!(validate_sensitivity(0.5).is_ok());
        assert!(validate_sensitivity(1.0).is_ok());
        assert!(validate_sensitivity(-0.1).is_err());
        assert!(validate_sensitivity(1.1).is_err());
        assert!(validate_sensitivity(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_sensitivity_error_message() {
        let err = validate_sensitivity(1.5).unwrap_err();
        assert_eq!(
            err.to_string(),
            "DetectionError: invalid configuration: sensitivity must be 0-1, got 1.5"
        );
    }

    #[test]
    fn test_contamination_clamp() {
        assert_eq!(contamination(0.1), 0.1);
        assert_eq!(contamination(1.0), 0.5);
        assert_eq!(contamination(0.0), MIN_CONTAMINATION);
    }

    #[test]
    fn test_normalize_reference_points() {
        let c = average_path_length(256);
        assert!((normalize(c, 256) - 0.5).abs() < 1e-12);
        assert_eq!(normalize(0.0, 256), 1.0);
        assert!(normalize(4.0 * c, 256) < 0.1);
        assert_eq!(normalize(3.0, 1), 0.5);
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile(&sorted, 1.0), Some(5.0));
        assert_eq!(quantile(&sorted, 0.5), Some(3.0));
        assert!((quantile(&sorted, 0.8).unwrap() - 4.2).abs() < 1e-12);
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_classify_top_fraction() {
        let scores: Vec<f64> = (0..10).map(|i| i as f64 / 10.0).collect();

        let flags = flags_for(&indexed(&scores), 0.1);
        let flagged: Vec<usize> = flags.iter().filter(|(_, f)| **f).map(|(&i, _)| i).collect();
        assert_eq!(flagged, vec![9]);

        let flags = flags_for(&indexed(&scores), 0.2);
        let flagged: Vec<usize> = flags.iter().filter(|(_, f)| **f).map(|(&i, _)| i).collect();
        assert_eq!(flagged, vec![8, 9]);
    }

    #[test]
    fn test_classify_row_on_quantile_not_flagged() {
        // n = 11 puts the 0.9 quantile exactly on the score of row 9
        let scores: Vec<f64> = (0..=10).map(|i| i as f64 / 10.0).collect();
        let (threshold, flags) = classify(&indexed(&scores), 0.1).unwrap();

        assert!((threshold.value - 0.9).abs() < 1e-12);
        assert!(!threshold.include_ties);
        let flagged: Vec<usize> = flags.iter().filter(|(_, f)| **f).map(|(&i, _)| i).collect();
        assert_eq!(flagged, vec![10]);
    }

    #[test]
    fn test_classify_constant_scores_flags_none() {
        let flags = flags_for(&indexed(&[0.4; 10]), 0.3);
        assert_eq!(flags.len(), 10);
        assert!(flags.values().all(|&f| !f));
    }

    #[test]
    fn test_classify_ties_fill_budget() {
        // Budget of 2 at p = 0.2: the outlier plus both rows tied at the quantile would overflow
        let scores = [0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.2, 0.2, 0.9];
        let flags = flags_for(&indexed(&scores), 0.2);
        assert_eq!(flags.values().filter(|&&f| f).count(), 1);
        assert!(flags[&9]);

        // h = 7.2 interpolates between 0.5 and 0.9, so both 0.9 rows are above it
        let scores = [0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.5, 0.9, 0.9];
        let flags = flags_for(&indexed(&scores), 0.2);
        assert_eq!(flags.values().filter(|&&f| f).count(), 2);
    }

    #[test]
    fn test_classify_keeps_row_indices() {
        let scores: BTreeMap<usize, f64> = [(3, 0.2), (7, 0.9), (12, 0.3)].into_iter().collect();
        let flags = flags_for(&scores, 0.5);
        assert_eq!(flags.keys().copied().collect::<Vec<_>>(), vec![3, 7, 12]);
        assert!(flags[&7]);
        assert!(!flags[&3]);
    }

    #[test]
    fn test_classify_empty() {
        assert!(classify(&BTreeMap::new(), 0.1).is_none());
    }

    proptest! {
        #[test]
        fn prop_normalize_non_increasing(a in 0.0f64..50.0, b in 0.0f64..50.0, n in 2usize..1024) {
            let (short, long) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(normalize(short, n) >= normalize(long, n));
            prop_assert!((0.0..=1.0).contains(&normalize(long, n)));
        }

        #[test]
        fn prop_flags_at_most_half(scores in prop::collection::vec(0.0f64..1.0, 1..200), sensitivity in 0.0f64..=1.0) {
            let flags = flags_for(&indexed(&scores), sensitivity);
            let flagged = flags.values().filter(|&&f| f).count();
            prop_assert!(flagged <= scores.len() / 2);
        }
    }
}
