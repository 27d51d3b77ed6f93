//! Projection of computed series onto a calendar anchor, and the write path.
//!
//! This is the only place externally visible state is mutated.

use crate::core::bounds::BoundSeries;
use crate::historian::{AttributeRef, Historian, HistorianError, WriteMode};
use chrono::{DateTime, Duration, Utc};

/// Re-timestamp entry *i* to `anchor + i·interval`.
///
/// The statistics-stage timestamps only mattered for cross-slice ordering
/// and are discarded here.
pub fn project(
    values: &[(f64, DateTime<Utc>)],
    anchor: DateTime<Utc>,
    interval: Duration,
) -> Vec<(f64, DateTime<Utc>)> {
    values
        .iter()
        .enumerate()
        .map(|(i, (value, _))| (*value, anchor + interval * i as i32))
        .collect()
}

/// Timestamp of the "no data" marker: one interval past the last value.
pub fn sentinel_timestamp(
    len: usize,
    anchor: DateTime<Utc>,
    interval: Duration,
) -> DateTime<Utc> {
    anchor + interval * len as i32
}

/// Project a series onto the anchor and write it, terminated by the
/// "no data" sentinel.
pub fn write_projected<H: Historian>(
    historian: &mut H,
    attribute: &AttributeRef,
    series: &BoundSeries,
    anchor: DateTime<Utc>,
    interval: Duration,
    mode: WriteMode,
) -> Result<(), HistorianError> {
    let projected = project(series, anchor, interval);
    historian.write_series(attribute, &projected, mode)?;
    historian.write_sentinel(attribute, sentinel_timestamp(series.len(), anchor, interval))
}
