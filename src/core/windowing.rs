//! Event windows, sample series, and slice alignment.
//!
//! Windows are aligned by sample position, not by wall-clock time: slice *i*
//! collects the *i*-th sample of every window series long enough to have one.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named, time-bounded observation window over the sensor signal.
///
/// A window with no end time is still in progress. Windows are immutable once
/// fetched; the population is refreshed wholesale on recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventWindow {
    /// Unique identifier assigned by the historian
    pub id: Uuid,
    /// Display name of the window
    pub name: String,
    /// Start time of the window
    pub start: DateTime<Utc>,
    /// End time, or `None` while the window is open
    pub end: Option<DateTime<Utc>>,
    /// Whether the window matches the configured selector
    pub matches_selector: bool,
}

impl EventWindow {
    /// Create a closed window spanning `[start, end]`.
    pub fn closed(name: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start,
            end: Some(end),
            matches_selector: true,
        }
    }

    /// Create a window that is still in progress.
    pub fn in_progress(name: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start,
            end: None,
            matches_selector: true,
        }
    }

    /// Whether the window has no end time yet.
    pub fn is_in_progress(&self) -> bool {
        self.end.is_none()
    }

    /// Duration of the window, if it has ended.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }
}

/// Quality flag carried by every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quality {
    Good,
    Bad,
}

/// A single resampled sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp of the reading
    pub timestamp: DateTime<Utc>,
    /// Sensor value; meaningless when quality is Bad
    pub value: f64,
    /// Quality flag
    pub quality: Quality,
}

impl Sample {
    /// Create a good-quality sample.
    pub fn good(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp,
            value,
            quality: Quality::Good,
        }
    }

    /// Create a bad-quality sample.
    pub fn bad(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            value: f64::NAN,
            quality: Quality::Bad,
        }
    }

    /// Whether the sample may contribute to aggregation.
    pub fn is_good(&self) -> bool {
        self.quality == Quality::Good
    }
}

/// Fixed-interval value series for one window. Lengths vary by window
/// duration; the set of series for a population may be ragged.
pub type Series = Vec<Sample>;

/// Samples at a common offset index across all contributing series.
pub type Slice = Vec<Sample>;

/// Transpose a ragged set of per-window series into offset-indexed slices.
///
/// The output length equals the longest series; shorter series simply stop
/// contributing once exhausted and are never padded. Single pass over each
/// series, O(total sample count).
pub fn align(series: &[Series]) -> Vec<Slice> {
    let mut slices: Vec<Slice> = Vec::new();
    for trend in series {
        for (i, sample) in trend.iter().enumerate() {
            if slices.len() <= i {
                slices.push(Slice::new());
            }
            slices[i].push(*sample);
        }
    }
    slices
}
