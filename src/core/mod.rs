//! Core computation stages.
//!
//! This module contains:
//! - Window, sample, and slice types plus positional alignment
//! - Trend extraction from the historian
//! - Per-slice statistics
//! - Bound derivation and projection onto a calendar anchor

pub mod bounds;
pub mod extract;
pub mod project;
pub mod stats;
pub mod windowing;

// Re-export commonly used types
pub use bounds::{compute_bound, compute_series, BoundFormula, BoundSeries};
pub use extract::{BadSamplePolicy, TrendExtractor};
pub use project::{project, write_projected};
pub use stats::{summarize, summarize_all, DegenerateSliceError, SliceStatistics};
pub use windowing::{align, EventWindow, Quality, Sample, Series, Slice};
