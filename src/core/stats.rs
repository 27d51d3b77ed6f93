//! Per-slice statistics.
//!
//! Mean and standard deviation are computed in a single Welford-style pass,
//! with min/max and the representative timestamp tracked alongside. Bad
//! samples never contribute.

use crate::core::windowing::Slice;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary statistics for one slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceStatistics {
    /// Arithmetic mean of the contributing samples
    pub mean: f64,
    /// Sample standard deviation (count − 1 divisor); 0 for a singleton
    pub stddev: f64,
    /// Smallest contributing value
    pub min: f64,
    /// Largest contributing value
    pub max: f64,
    /// Number of contributing samples, always ≥ 1
    pub count: usize,
    /// Timestamp of the most recently timestamped contributing sample
    pub timestamp: DateTime<Utc>,
}

/// A slice with no contributing samples reached the statistics stage.
///
/// The aligner never emits one by construction; seeing this means a
/// collaborator handed us a slice made entirely of bad samples.
#[derive(Debug, Clone)]
pub struct DegenerateSliceError {
    /// Offset index of the offending slice, when known
    pub slice_index: Option<usize>,
}

impl std::fmt::Display for DegenerateSliceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.slice_index {
            Some(i) => write!(f, "slice {i} has no contributing samples"),
            None => write!(f, "slice has no contributing samples"),
        }
    }
}

impl std::error::Error for DegenerateSliceError {}

/// Summarize one slice.
///
/// Bad-quality samples are skipped; a slice with zero good samples fails
/// rather than dividing by a non-positive degrees-of-freedom term. The
/// representative timestamp is the latest among contributors, resolving ties
/// to the last one encountered in slice order.
pub fn summarize(slice: &Slice) -> Result<SliceStatistics, DegenerateSliceError> {
    let mut count = 0usize;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut timestamp: Option<DateTime<Utc>> = None;

    for sample in slice.iter().filter(|s| s.is_good()) {
        count += 1;
        let delta = sample.value - mean;
        mean += delta / count as f64;
        m2 += delta * (sample.value - mean);

        min = min.min(sample.value);
        max = max.max(sample.value);
        if timestamp.map_or(true, |t| sample.timestamp >= t) {
            timestamp = Some(sample.timestamp);
        }
    }

    let timestamp = timestamp.ok_or(DegenerateSliceError { slice_index: None })?;

    // Singleton slices bypass the general formula entirely.
    let stddev = if count < 2 { 0.0 } else { (m2 / (count - 1) as f64).sqrt() };

    Ok(SliceStatistics {
        mean,
        stddev,
        min,
        max,
        count,
        timestamp,
    })
}

/// Summarize every slice in order, tagging failures with the slice index.
pub fn summarize_all(slices: &[Slice]) -> Result<Vec<SliceStatistics>, DegenerateSliceError> {
    slices
        .iter()
        .enumerate()
        .map(|(i, slice)| {
            summarize(slice).map_err(|_| DegenerateSliceError {
                slice_index: Some(i),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::windowing::{Quality, Sample};
    use chrono::TimeZone;
    use statrs::statistics::Statistics;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn good_samples(values: &[f64]) -> Slice {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::good(t(i as i64), v))
            .collect()
    }

    #[test]
    fn test_singleton_slice() {
        let slice = good_samples(&[42.5]);
        let stats = summarize(&slice).unwrap();
        assert_eq!(stats.mean, 42.5);
        assert_eq!(stats.min, 42.5);
        assert_eq!(stats.max, 42.5);
        assert_eq!(stats.stddev, 0.0);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_mean_between_min_and_max() {
        let cases: Vec<Vec<f64>> = vec![
            vec![1.0, 2.0, 0.0],
            vec![-3.5, 7.25, 0.0, 0.0, 12.0],
            vec![5.0, 5.0, 5.0],
            vec![0.001, -0.001],
        ];
        for values in cases {
            let stats = summarize(&good_samples(&values)).unwrap();
            assert!(stats.min <= stats.mean, "min > mean for {values:?}");
            assert!(stats.mean <= stats.max, "mean > max for {values:?}");
        }
    }

    #[test]
    fn test_welford_matches_statrs_sample_stddev() {
        // Pins the divisor convention: sample standard deviation, count − 1.
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0, 1.25, -3.0];
        let stats = summarize(&good_samples(&values)).unwrap();

        let expected_mean = values.as_slice().mean();
        let expected_std = values.as_slice().std_dev();
        assert!((stats.mean - expected_mean).abs() < 1e-12);
        assert!((stats.stddev - expected_std).abs() < 1e-12);
    }

    #[test]
    fn test_identical_values_have_zero_stddev() {
        let stats = summarize(&good_samples(&[3.0, 3.0, 3.0, 3.0])).unwrap();
        assert_eq!(stats.stddev, 0.0);
    }

    #[test]
    fn test_bad_samples_excluded() {
        let mut slice = good_samples(&[1.0, 2.0, 0.0]);
        slice.push(Sample::bad(t(10)));
        let stats = summarize(&slice).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, 1.0);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 2.0);
    }

    #[test]
    fn test_all_bad_slice_is_degenerate() {
        let slice: Slice = vec![Sample::bad(t(0)), Sample::bad(t(1))];
        assert!(summarize(&slice).is_err());
        assert!(summarize(&Slice::new()).is_err());
    }

    #[test]
    fn test_timestamp_is_most_recent_last_on_tie() {
        let slice: Slice = vec![
            Sample::good(t(5), 1.0),
            Sample::good(t(9), 2.0),
            Sample {
                timestamp: t(9),
                value: 3.0,
                quality: Quality::Good,
            },
            Sample::good(t(2), 4.0),
        ];
        let stats = summarize(&slice).unwrap();
        assert_eq!(stats.timestamp, t(9));
    }

    #[test]
    fn test_summarize_all_reports_index() {
        let slices = vec![good_samples(&[1.0]), Slice::new()];
        let err = summarize_all(&slices).unwrap_err();
        assert_eq!(err.slice_index, Some(1));
    }
}
