//! The bounds engine: pipeline composition and cross-pass state.
//!
//! One engine instance owns the historian handle, the configured outputs,
//! and the only state carried between passes: the last computed slice
//! statistics and the last write anchor. Everything else is rebuilt from
//! scratch on each recomputation.

use crate::config::Config;
use crate::core::bounds::{compute_series, BoundFormula, BoundSeries};
use crate::core::extract::{BadSamplePolicy, TrendExtractor};
use crate::core::project::write_projected;
use crate::core::stats::{summarize_all, DegenerateSliceError, SliceStatistics};
use crate::core::windowing::{align, EventWindow};
use crate::historian::{AttributeRef, Historian, HistorianError, WindowSelector, WriteMode};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// One configured output attribute and how to derive it.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub attribute: AttributeRef,
    pub formula: BoundFormula,
    pub write_mode: WriteMode,
}

/// Engine-facing settings, resolved from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub sensor: AttributeRef,
    pub outputs: Vec<OutputSpec>,
    pub selector: WindowSelector,
    pub sample_interval: Duration,
    pub bad_sample_policy: BadSamplePolicy,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sensor: AttributeRef::new(config.sensor_path.clone()),
            outputs: config
                .outputs
                .iter()
                .map(|o| OutputSpec {
                    attribute: AttributeRef::new(o.path.clone()),
                    formula: o.formula,
                    write_mode: o.write_mode,
                })
                .collect(),
            selector: config.selector(),
            sample_interval: config.sample_interval(),
            bad_sample_policy: config.bad_sample_policy,
        }
    }
}

/// Errors from a recomputation or append pass.
#[derive(Debug)]
pub enum EngineError {
    Historian(HistorianError),
    DegenerateSlice(DegenerateSliceError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Historian(e) => write!(f, "historian error: {e}"),
            EngineError::DegenerateSlice(e) => write!(f, "degenerate slice: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<HistorianError> for EngineError {
    fn from(e: HistorianError) -> Self {
        EngineError::Historian(e)
    }
}

impl From<DegenerateSliceError> for EngineError {
    fn from(e: DegenerateSliceError) -> Self {
        EngineError::DegenerateSlice(e)
    }
}

/// Window-aggregation engine with incremental recompute.
pub struct BoundsEngine<H: Historian> {
    historian: H,
    settings: EngineSettings,
    extractor: TrendExtractor,
    /// Statistics from the last completed recomputation, one per slice
    stats: Vec<SliceStatistics>,
    /// Anchor used by the last write, for recomputes with no open window
    last_anchor: Option<DateTime<Utc>>,
}

impl<H: Historian> BoundsEngine<H> {
    pub fn new(historian: H, settings: EngineSettings) -> Self {
        let extractor = TrendExtractor::new(settings.sample_interval, settings.bad_sample_policy);
        Self {
            historian,
            settings,
            extractor,
            stats: Vec::new(),
            last_anchor: None,
        }
    }

    /// Borrow the historian, e.g. for polling the change feed.
    pub fn historian(&self) -> &H {
        &self.historian
    }

    /// Mutably borrow the historian, e.g. for host-side store setup.
    pub fn historian_mut(&mut self) -> &mut H {
        &mut self.historian
    }

    /// Selector for the configured window population.
    pub fn selector(&self) -> &WindowSelector {
        &self.settings.selector
    }

    /// Statistics from the last completed recomputation.
    pub fn slice_statistics(&self) -> &[SliceStatistics] {
        &self.stats
    }

    /// Derived series for every configured output, from the cached statistics.
    pub fn output_series(&self) -> Vec<(AttributeRef, BoundSeries)> {
        self.settings
            .outputs
            .iter()
            .map(|o| (o.attribute.clone(), compute_series(o.formula, &self.stats)))
            .collect()
    }

    /// Resolve every configured attribute, then run the first full pass.
    ///
    /// An unresolvable sensor or output path is fatal; it surfaces here,
    /// before the poll loop ever starts.
    pub fn initial_run(&mut self) -> Result<(), EngineError> {
        self.historian.resolve_attribute(&self.settings.sensor)?;
        for output in &self.settings.outputs {
            self.historian.resolve_attribute(&output.attribute)?;
        }
        self.full_recompute()
    }

    /// Re-run the whole pipeline: fetch the population, extract, align,
    /// summarize, derive bounds, and write.
    ///
    /// The output is written once per currently in-progress matching window,
    /// anchored at that window's start; with no open window the last anchor
    /// is reused. Identical store state yields bit-identical output.
    pub fn full_recompute(&mut self) -> Result<(), EngineError> {
        let windows = self.historian.find_windows(&self.settings.selector)?;
        let (open, closed): (Vec<EventWindow>, Vec<EventWindow>) =
            windows.into_iter().partition(|w| w.is_in_progress());

        let series = self
            .extractor
            .extract(&self.historian, &self.settings.sensor, &closed);
        let slices = align(&series);
        self.stats = summarize_all(&slices)?;

        info!(
            windows = closed.len(),
            slices = self.stats.len(),
            "recomputed slice statistics"
        );

        let anchors: Vec<DateTime<Utc>> = if open.is_empty() {
            self.last_anchor.into_iter().collect()
        } else {
            open.iter().map(|w| w.start).collect()
        };
        if anchors.is_empty() {
            debug!("no write anchor available, skipping write");
            return Ok(());
        }
        for anchor in anchors {
            self.write_outputs(anchor)?;
        }
        Ok(())
    }

    /// Re-anchor the cached bound series at a newly opened window.
    ///
    /// A window opening does not change the historical population behind
    /// the limits, so nothing is refetched or recomputed; the bounds are
    /// derived from the cached statistics and written at the new start.
    pub fn fast_append(&mut self, window: &EventWindow) -> Result<(), EngineError> {
        debug!(window = %window.name, "fast append at new window start");
        self.write_outputs(window.start)
    }

    fn write_outputs(&mut self, anchor: DateTime<Utc>) -> Result<(), EngineError> {
        for output in &self.settings.outputs {
            let series = compute_series(output.formula, &self.stats);
            write_projected(
                &mut self.historian,
                &output.attribute,
                &series,
                anchor,
                self.settings.sample_interval,
                output.write_mode,
            )?;
        }
        self.last_anchor = Some(anchor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::historian::memory::{MemoryHistorian, StoredValue};
    use crate::historian::TimeRange;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn sensor() -> AttributeRef {
        AttributeRef::new("line/sensor")
    }

    fn lower() -> AttributeRef {
        AttributeRef::new("line/limits/lower")
    }

    fn upper() -> AttributeRef {
        AttributeRef::new("line/limits/upper")
    }

    fn settings() -> EngineSettings {
        EngineSettings {
            sensor: sensor(),
            outputs: vec![
                OutputSpec {
                    attribute: lower(),
                    formula: BoundFormula::MeanMinus3Sigma,
                    write_mode: WriteMode::Insert,
                },
                OutputSpec {
                    attribute: upper(),
                    formula: BoundFormula::MeanPlus3Sigma,
                    write_mode: WriteMode::Insert,
                },
            ],
            selector: WindowSelector::recent("Batch", 50),
            sample_interval: Duration::seconds(1),
            bad_sample_policy: BadSamplePolicy::ExcludeAtAggregation,
        }
    }

    /// Three closed windows over a stored ramp signal, one open window.
    fn seeded_historian() -> MemoryHistorian {
        let mut historian = MemoryHistorian::new();
        historian.ensure_attribute(sensor());
        historian.ensure_attribute(lower());
        historian.ensure_attribute(upper());
        for i in 0..60 {
            historian.record_value(&sensor(), t(i), (i % 7) as f64);
        }
        historian.add_window(EventWindow::closed("w1", t(0), t(4)), "Batch");
        historian.add_window(EventWindow::closed("w2", t(10), t(12)), "Batch");
        historian.add_window(EventWindow::closed("w3", t(20), t(23)), "Batch");
        historian.add_window(EventWindow::in_progress("w4", t(40)), "Batch");
        historian
    }

    #[test]
    fn test_initial_run_requires_resolvable_attributes() {
        // upper bound attribute never created
        let mut historian = MemoryHistorian::new();
        historian.ensure_attribute(sensor());
        historian.ensure_attribute(lower());
        let mut engine = BoundsEngine::new(historian, settings());
        let result = engine.initial_run();
        assert!(matches!(
            result,
            Err(EngineError::Historian(HistorianError::AttributeNotFound(_)))
        ));
    }

    #[test]
    fn test_full_recompute_builds_expected_slices() {
        let mut engine = BoundsEngine::new(seeded_historian(), settings());
        engine.initial_run().unwrap();

        // Longest closed window has 5 samples
        assert_eq!(engine.slice_statistics().len(), 5);
        for stats in engine.slice_statistics() {
            assert!(stats.count >= 1);
            assert!(stats.min <= stats.mean && stats.mean <= stats.max);
        }
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut engine = BoundsEngine::new(seeded_historian(), settings());
        engine.initial_run().unwrap();
        let first = engine.output_series();

        engine.full_recompute().unwrap();
        let second = engine.output_series();

        assert_eq!(first, second);
    }

    #[test]
    fn test_write_anchored_at_open_window() {
        let mut engine = BoundsEngine::new(seeded_historian(), settings());
        engine.initial_run().unwrap();

        let len = engine.slice_statistics().len();
        let written = engine.historian().stored_range(
            &lower(),
            TimeRange {
                start: t(40),
                end: t(40 + len as i64),
            },
        );
        // len values plus the sentinel one interval past the end
        assert_eq!(written.len(), len + 1);
        assert_eq!(written[len].1, StoredValue::NoData);
    }

    #[test]
    fn test_lower_upper_invariant_on_written_series() {
        let mut engine = BoundsEngine::new(seeded_historian(), settings());
        engine.initial_run().unwrap();

        let outputs = engine.output_series();
        let (_, lower_series) = &outputs[0];
        let (_, upper_series) = &outputs[1];
        for (low, up) in lower_series.iter().zip(upper_series.iter()) {
            assert!(low.0 <= up.0);
        }
    }

    #[test]
    fn test_fast_append_does_not_refetch() {
        let mut engine = BoundsEngine::new(seeded_historian(), settings());
        engine.initial_run().unwrap();

        let fetches_before = engine.historian().calls.find_windows();
        let reads_before = engine.historian().calls.interpolated();
        let writes_before = engine.historian().calls.series_writes();

        let window = EventWindow::in_progress("w5", t(50));
        engine.fast_append(&window).unwrap();

        assert_eq!(engine.historian().calls.find_windows(), fetches_before);
        assert_eq!(engine.historian().calls.interpolated(), reads_before);
        // one series write per configured output
        assert_eq!(engine.historian().calls.series_writes(), writes_before + 2);
    }

    #[test]
    fn test_recompute_without_open_window_reuses_last_anchor() {
        let historian = seeded_historian();
        let open_id = historian
            .find_windows(&WindowSelector::recent("Batch", 50))
            .unwrap()
            .into_iter()
            .find(|w| w.is_in_progress())
            .unwrap()
            .id;
        let mut engine = BoundsEngine::new(historian, settings());
        // first pass anchors at the open window's start
        engine.initial_run().unwrap();

        // close it; the next recompute falls back to the last anchor
        engine.historian_mut().close_window(open_id, t(45));
        let writes_before = engine.historian().calls.series_writes();
        engine.full_recompute().unwrap();
        assert!(engine.historian().calls.series_writes() > writes_before);
    }

    #[test]
    fn test_recompute_with_no_anchor_skips_write() {
        let mut historian = MemoryHistorian::new();
        historian.ensure_attribute(sensor());
        historian.ensure_attribute(lower());
        historian.ensure_attribute(upper());
        for i in 0..10 {
            historian.record_value(&sensor(), t(i), i as f64);
        }
        historian.add_window(EventWindow::closed("w1", t(0), t(4)), "Batch");

        let mut engine = BoundsEngine::new(historian, settings());
        engine.initial_run().unwrap();
        assert_eq!(engine.historian().calls.series_writes(), 0);
        assert_eq!(engine.slice_statistics().len(), 5);
    }
}
