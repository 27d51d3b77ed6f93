//! Per-window trend extraction from the historian.

use crate::core::windowing::{EventWindow, Series};
use crate::historian::{AttributeRef, Historian, TimeRange};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where bad-quality samples are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadSamplePolicy {
    /// Drop bad samples before they enter the series
    ExcludeAtExtraction,
    /// Keep bad samples in the series; the statistics stage skips them
    #[default]
    ExcludeAtAggregation,
}

/// Pulls fixed-interval resampled series for the sensor over each window.
#[derive(Debug, Clone)]
pub struct TrendExtractor {
    interval: Duration,
    policy: BadSamplePolicy,
}

impl TrendExtractor {
    pub fn new(interval: Duration, policy: BadSamplePolicy) -> Self {
        Self { interval, policy }
    }

    /// Sampling interval used for every query.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Extract one series per window, in window order.
    ///
    /// Windows are independent: an open-ended window, or one whose range the
    /// historian cannot read, contributes an empty series instead of
    /// aborting the batch.
    pub fn extract<H: Historian>(
        &self,
        historian: &H,
        sensor: &AttributeRef,
        windows: &[EventWindow],
    ) -> Vec<Series> {
        windows
            .iter()
            .map(|window| self.extract_one(historian, sensor, window))
            .collect()
    }

    fn extract_one<H: Historian>(
        &self,
        historian: &H,
        sensor: &AttributeRef,
        window: &EventWindow,
    ) -> Series {
        let Some(end) = window.end else {
            return Series::new();
        };
        let range = TimeRange {
            start: window.start,
            end,
        };
        match historian.interpolated_series(sensor, range, self.interval) {
            Ok(series) => match self.policy {
                BadSamplePolicy::ExcludeAtExtraction => {
                    series.into_iter().filter(|s| s.is_good()).collect()
                }
                BadSamplePolicy::ExcludeAtAggregation => series,
            },
            Err(e) => {
                warn!(window = %window.name, error = %e, "trend extraction failed, skipping window");
                Series::new()
            }
        }
    }
}
