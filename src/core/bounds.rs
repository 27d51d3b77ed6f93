//! Derivation of control-bound series from slice statistics.
//!
//! Each configured output maps slice statistics to one value per slice via a
//! fixed formula. The production pair is mean ∓ 3σ; since the standard
//! deviation is nonnegative by construction, the minus form is always the
//! lower bound.

use crate::core::stats::SliceStatistics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Formula used to derive one output value from slice statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundFormula {
    Mean,
    MeanPlusSigma,
    MeanMinusSigma,
    MeanPlus2Sigma,
    MeanMinus2Sigma,
    MeanPlus3Sigma,
    MeanMinus3Sigma,
    Minimum,
    Maximum,
}

impl BoundFormula {
    /// Signed sigma multiplier, 0 for the non-sigma formulas.
    pub fn sigma_multiplier(&self) -> f64 {
        match self {
            BoundFormula::Mean | BoundFormula::Minimum | BoundFormula::Maximum => 0.0,
            BoundFormula::MeanPlusSigma => 1.0,
            BoundFormula::MeanMinusSigma => -1.0,
            BoundFormula::MeanPlus2Sigma => 2.0,
            BoundFormula::MeanMinus2Sigma => -2.0,
            BoundFormula::MeanPlus3Sigma => 3.0,
            BoundFormula::MeanMinus3Sigma => -3.0,
        }
    }
}

impl std::fmt::Display for BoundFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BoundFormula::Mean => "mean",
            BoundFormula::MeanPlusSigma => "mean+sigma",
            BoundFormula::MeanMinusSigma => "mean-sigma",
            BoundFormula::MeanPlus2Sigma => "mean+2sigma",
            BoundFormula::MeanMinus2Sigma => "mean-2sigma",
            BoundFormula::MeanPlus3Sigma => "mean+3sigma",
            BoundFormula::MeanMinus3Sigma => "mean-3sigma",
            BoundFormula::Minimum => "minimum",
            BoundFormula::Maximum => "maximum",
        };
        f.write_str(name)
    }
}

/// One derived output series, produced once per recomputation.
pub type BoundSeries = Vec<(f64, DateTime<Utc>)>;

/// Derive one value from slice statistics. Pure and total.
pub fn compute_bound(formula: BoundFormula, stats: &SliceStatistics) -> (f64, DateTime<Utc>) {
    let value = match formula {
        BoundFormula::Minimum => stats.min,
        BoundFormula::Maximum => stats.max,
        _ => stats.mean + formula.sigma_multiplier() * stats.stddev,
    };
    (value, stats.timestamp)
}

/// Derive a whole series, one entry per slice in order.
pub fn compute_series(formula: BoundFormula, stats: &[SliceStatistics]) -> BoundSeries {
    stats.iter().map(|s| compute_bound(formula, s)).collect()
}
