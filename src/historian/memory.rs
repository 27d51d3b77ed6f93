//! In-memory historian.
//!
//! Backs the host binary (loaded from a JSON snapshot file) and the test
//! suite. Attribute histories are step-interpolated: a read at time *t*
//! yields the latest recorded value at or before *t*.

use crate::core::windowing::{EventWindow, Sample, Series};
use crate::historian::{
    AttributeRef, Change, ChangeAction, ChangeCursor, EntityKind, Historian, HistorianError,
    PopulationMode, TimeRange, WindowSelector, WriteMode,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// One stored point of attribute history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StoredValue {
    /// A real measurement or computed value
    Value(f64),
    /// The "no data" marker terminating a series
    NoData,
}

/// A window plus the selector-facing metadata the store would hold for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowRecord {
    pub window: EventWindow,
    /// Template the window was created from
    pub template: String,
    /// Extended properties attached to the window
    #[serde(default)]
    pub extended_properties: HashMap<String, String>,
}

/// Serializable store content consumed by the host binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistorianSnapshot {
    pub windows: Vec<WindowRecord>,
    /// Raw attribute histories: path → (timestamp, value) points
    pub attributes: HashMap<String, Vec<(DateTime<Utc>, f64)>>,
}

/// Read/write call counters, for diagnostics and scenario assertions.
#[derive(Debug, Default)]
pub struct CallCounts {
    find_windows: AtomicU64,
    interpolated: AtomicU64,
    series_writes: AtomicU64,
    sentinel_writes: AtomicU64,
}

impl CallCounts {
    pub fn find_windows(&self) -> u64 {
        self.find_windows.load(Ordering::Relaxed)
    }

    pub fn interpolated(&self) -> u64 {
        self.interpolated.load(Ordering::Relaxed)
    }

    pub fn series_writes(&self) -> u64 {
        self.series_writes.load(Ordering::Relaxed)
    }

    pub fn sentinel_writes(&self) -> u64 {
        self.sentinel_writes.load(Ordering::Relaxed)
    }
}

/// In-memory implementation of [`Historian`].
#[derive(Debug, Default)]
pub struct MemoryHistorian {
    records: Vec<WindowRecord>,
    histories: HashMap<AttributeRef, BTreeMap<DateTime<Utc>, StoredValue>>,
    feed: Vec<Change>,
    /// When set, reads and the change feed fail with SourceUnavailable
    offline: bool,
    /// Call counters, observable while the historian is borrowed elsewhere
    pub calls: CallCounts,
}

impl MemoryHistorian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a historian from snapshot content.
    pub fn from_snapshot(snapshot: HistorianSnapshot) -> Self {
        let mut historian = Self::new();
        for record in snapshot.windows {
            historian.records.push(record);
        }
        for (path, points) in snapshot.attributes {
            let attr = AttributeRef::new(path);
            historian.ensure_attribute(attr.clone());
            for (timestamp, value) in points {
                historian.record_value(&attr, timestamp, value);
            }
        }
        historian
    }

    /// Load a snapshot file written by `HistorianSnapshot` serialization.
    pub fn from_snapshot_file(path: &Path) -> Result<Self, HistorianError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HistorianError::SourceUnavailable(format!("{}: {e}", path.display())))?;
        let snapshot: HistorianSnapshot = serde_json::from_str(&content)
            .map_err(|e| HistorianError::SourceUnavailable(format!("{}: {e}", path.display())))?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Create an attribute with no history yet.
    pub fn ensure_attribute(&mut self, attribute: AttributeRef) {
        self.histories.entry(attribute).or_default();
    }

    /// Whether the attribute path resolves.
    pub fn has_attribute(&self, attribute: &AttributeRef) -> bool {
        self.histories.contains_key(attribute)
    }

    /// Record one raw measurement.
    pub fn record_value(&mut self, attribute: &AttributeRef, timestamp: DateTime<Utc>, value: f64) {
        self.histories
            .entry(attribute.clone())
            .or_default()
            .insert(timestamp, StoredValue::Value(value));
    }

    /// Add a window and emit an Added change.
    pub fn add_window(&mut self, window: EventWindow, template: impl Into<String>) -> Uuid {
        let id = window.id;
        self.records.push(WindowRecord {
            window,
            template: template.into(),
            extended_properties: HashMap::new(),
        });
        self.push_change(EntityKind::Window, ChangeAction::Added, id);
        id
    }

    /// Attach an extended property to a window.
    pub fn set_extended_property(&mut self, id: Uuid, key: impl Into<String>, value: impl Into<String>) {
        if let Some(record) = self.records.iter_mut().find(|r| r.window.id == id) {
            record.extended_properties.insert(key.into(), value.into());
        }
    }

    /// Close an in-progress window and emit an Updated change.
    pub fn close_window(&mut self, id: Uuid, end: DateTime<Utc>) {
        if let Some(record) = self.records.iter_mut().find(|r| r.window.id == id) {
            record.window.end = Some(end);
            self.push_change(EntityKind::Window, ChangeAction::Updated, id);
        }
    }

    /// Remove a window and emit a Removed change.
    pub fn remove_window(&mut self, id: Uuid) {
        let before = self.records.len();
        self.records.retain(|r| r.window.id != id);
        if self.records.len() != before {
            self.push_change(EntityKind::Window, ChangeAction::Removed, id);
        }
    }

    /// Emit an arbitrary change record (e.g. for non-window entities).
    pub fn push_change(&mut self, entity_kind: EntityKind, action: ChangeAction, entity_id: Uuid) {
        self.feed.push(Change {
            entity_kind,
            action,
            entity_id,
        });
    }

    /// Toggle simulated store unavailability.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Stored history points within a range, endpoints inclusive.
    pub fn stored_range(
        &self,
        attribute: &AttributeRef,
        range: TimeRange,
    ) -> Vec<(DateTime<Utc>, StoredValue)> {
        self.histories
            .get(attribute)
            .map(|history| {
                history
                    .range(range.start..=range.end)
                    .map(|(t, v)| (*t, *v))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The stored point at an exact timestamp, if any.
    pub fn stored_at(
        &self,
        attribute: &AttributeRef,
        timestamp: DateTime<Utc>,
    ) -> Option<StoredValue> {
        self.histories
            .get(attribute)
            .and_then(|history| history.get(&timestamp))
            .copied()
    }

    fn guard_online(&self) -> Result<(), HistorianError> {
        if self.offline {
            Err(HistorianError::SourceUnavailable(
                "historian is offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn matches_timeless(record: &WindowRecord, selector: &WindowSelector) -> bool {
        if record.template != selector.template {
            return false;
        }
        match (selector.mode, &selector.extended_property) {
            (PopulationMode::ExtendedProperties, Some((key, value))) => {
                record.extended_properties.get(key) == Some(value)
            }
            _ => true,
        }
    }
}

impl Historian for MemoryHistorian {
    fn resolve_attribute(&self, attribute: &AttributeRef) -> Result<(), HistorianError> {
        if self.has_attribute(attribute) {
            Ok(())
        } else {
            Err(HistorianError::AttributeNotFound(attribute.to_string()))
        }
    }

    fn find_windows(&self, selector: &WindowSelector) -> Result<Vec<EventWindow>, HistorianError> {
        self.guard_online()?;
        self.calls.find_windows.fetch_add(1, Ordering::Relaxed);

        let by_template: Vec<&WindowRecord> = self
            .records
            .iter()
            .filter(|r| r.template == selector.template)
            .collect();

        let mut selected: Vec<&WindowRecord> = Vec::new();
        if matches!(selector.mode, PopulationMode::Recent | PopulationMode::Both) {
            let mut recent = by_template.clone();
            recent.sort_by_key(|r| r.window.start);
            if let Some(cap) = selector.recent_count {
                let skip = recent.len().saturating_sub(cap);
                recent.drain(..skip);
            }
            selected.extend(recent);
        }
        if matches!(
            selector.mode,
            PopulationMode::ExtendedProperties | PopulationMode::Both
        ) {
            if let Some((key, value)) = &selector.extended_property {
                selected.extend(
                    by_template
                        .iter()
                        .copied()
                        .filter(|r| r.extended_properties.get(key) == Some(value)),
                );
            }
        }

        let mut windows: Vec<EventWindow> = Vec::new();
        for record in selected {
            if windows.iter().any(|w| w.id == record.window.id) {
                continue;
            }
            let mut window = record.window.clone();
            window.matches_selector = true;
            windows.push(window);
        }
        windows.sort_by_key(|w| w.start);
        Ok(windows)
    }

    fn find_window(
        &self,
        id: Uuid,
        selector: &WindowSelector,
    ) -> Result<Option<EventWindow>, HistorianError> {
        self.guard_online()?;
        Ok(self.records.iter().find(|r| r.window.id == id).map(|record| {
            let mut window = record.window.clone();
            window.matches_selector = Self::matches_timeless(record, selector);
            window
        }))
    }

    fn interpolated_series(
        &self,
        attribute: &AttributeRef,
        range: TimeRange,
        interval: Duration,
    ) -> Result<Series, HistorianError> {
        self.guard_online()?;
        self.calls.interpolated.fetch_add(1, Ordering::Relaxed);

        if range.end < range.start {
            return Err(HistorianError::MalformedRange(format!(
                "{} .. {}",
                range.start, range.end
            )));
        }
        let history = self
            .histories
            .get(attribute)
            .ok_or_else(|| HistorianError::AttributeNotFound(attribute.to_string()))?;

        let mut series = Series::new();
        let mut tick = range.start;
        while tick <= range.end {
            let latest = history
                .range(..=tick)
                .next_back()
                .map(|(_, v)| *v);
            series.push(match latest {
                Some(StoredValue::Value(value)) => Sample::good(tick, value),
                Some(StoredValue::NoData) | None => Sample::bad(tick),
            });
            tick += interval;
        }
        Ok(series)
    }

    fn poll_changes(
        &self,
        cursor: ChangeCursor,
    ) -> Result<(Vec<Change>, ChangeCursor), HistorianError> {
        self.guard_online()?;
        let from = (cursor.0 as usize).min(self.feed.len());
        let changes = self.feed[from..].to_vec();
        Ok((changes, ChangeCursor(self.feed.len() as u64)))
    }

    fn write_series(
        &mut self,
        attribute: &AttributeRef,
        values: &[(f64, DateTime<Utc>)],
        mode: WriteMode,
    ) -> Result<(), HistorianError> {
        self.calls.series_writes.fetch_add(1, Ordering::Relaxed);
        let history = self
            .histories
            .get_mut(attribute)
            .ok_or_else(|| HistorianError::AttributeNotFound(attribute.to_string()))?;
        if mode == WriteMode::Replace {
            history.clear();
        }
        for (value, timestamp) in values {
            history.insert(*timestamp, StoredValue::Value(*value));
        }
        Ok(())
    }

    fn write_sentinel(
        &mut self,
        attribute: &AttributeRef,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HistorianError> {
        self.calls.sentinel_writes.fetch_add(1, Ordering::Relaxed);
        let history = self
            .histories
            .get_mut(attribute)
            .ok_or_else(|| HistorianError::AttributeNotFound(attribute.to_string()))?;
        history.insert(timestamp, StoredValue::NoData);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::windowing::Quality;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn attr() -> AttributeRef {
        AttributeRef::new("plant/unit-1/temperature")
    }

    fn historian_with_points(points: &[(i64, f64)]) -> MemoryHistorian {
        let mut historian = MemoryHistorian::new();
        historian.ensure_attribute(attr());
        for (secs, value) in points {
            historian.record_value(&attr(), t(*secs), *value);
        }
        historian
    }

    #[test]
    fn test_step_interpolation() {
        let historian = historian_with_points(&[(0, 1.0), (2, 3.0)]);
        let series = historian
            .interpolated_series(
                &attr(),
                TimeRange {
                    start: t(0),
                    end: t(3),
                },
                Duration::seconds(1),
            )
            .unwrap();

        assert_eq!(series.len(), 4);
        assert_eq!(series[0].value, 1.0);
        assert_eq!(series[1].value, 1.0);
        assert_eq!(series[2].value, 3.0);
        assert_eq!(series[3].value, 3.0);
    }

    #[test]
    fn test_interpolation_before_first_point_is_bad() {
        let historian = historian_with_points(&[(2, 5.0)]);
        let series = historian
            .interpolated_series(
                &attr(),
                TimeRange {
                    start: t(0),
                    end: t(2),
                },
                Duration::seconds(1),
            )
            .unwrap();

        assert_eq!(series[0].quality, Quality::Bad);
        assert_eq!(series[1].quality, Quality::Bad);
        assert_eq!(series[2].quality, Quality::Good);
    }

    #[test]
    fn test_malformed_range() {
        let historian = historian_with_points(&[(0, 1.0)]);
        let result = historian.interpolated_series(
            &attr(),
            TimeRange {
                start: t(5),
                end: t(0),
            },
            Duration::seconds(1),
        );
        assert!(matches!(result, Err(HistorianError::MalformedRange(_))));
    }

    #[test]
    fn test_unknown_attribute() {
        let historian = MemoryHistorian::new();
        let result = historian.interpolated_series(
            &AttributeRef::new("nope"),
            TimeRange {
                start: t(0),
                end: t(1),
            },
            Duration::seconds(1),
        );
        assert!(matches!(result, Err(HistorianError::AttributeNotFound(_))));
    }

    #[test]
    fn test_insert_preserves_surrounding_history() {
        let mut historian = historian_with_points(&[(0, 1.0), (100, 9.0)]);
        historian
            .write_series(&attr(), &[(5.0, t(10)), (6.0, t(11))], WriteMode::Insert)
            .unwrap();

        assert_eq!(historian.stored_at(&attr(), t(0)), Some(StoredValue::Value(1.0)));
        assert_eq!(historian.stored_at(&attr(), t(100)), Some(StoredValue::Value(9.0)));
        assert_eq!(historian.stored_at(&attr(), t(10)), Some(StoredValue::Value(5.0)));
    }

    #[test]
    fn test_replace_overwrites_history() {
        let mut historian = historian_with_points(&[(0, 1.0), (100, 9.0)]);
        historian
            .write_series(&attr(), &[(5.0, t(10))], WriteMode::Replace)
            .unwrap();

        assert_eq!(historian.stored_at(&attr(), t(0)), None);
        assert_eq!(historian.stored_at(&attr(), t(100)), None);
        assert_eq!(historian.stored_at(&attr(), t(10)), Some(StoredValue::Value(5.0)));
    }

    #[test]
    fn test_change_feed_cursor() {
        let mut historian = MemoryHistorian::new();
        let id = historian.add_window(EventWindow::in_progress("w", t(0)), "Batch");

        let (changes, next) = historian.poll_changes(ChangeCursor::default()).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action, ChangeAction::Added);
        assert_eq!(changes[0].entity_id, id);

        let (changes, _) = historian.poll_changes(next).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_offline_poll_fails() {
        let mut historian = MemoryHistorian::new();
        historian.set_offline(true);
        assert!(matches!(
            historian.poll_changes(ChangeCursor::default()),
            Err(HistorianError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_recent_selector_caps_population() {
        let mut historian = MemoryHistorian::new();
        for i in 0..5 {
            historian.add_window(
                EventWindow::closed(format!("w{i}"), t(i * 10), t(i * 10 + 5)),
                "Batch",
            );
        }
        let windows = historian
            .find_windows(&WindowSelector::recent("Batch", 3))
            .unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].name, "w2");
        assert_eq!(windows[2].name, "w4");
    }

    #[test]
    fn test_extended_property_selector() {
        let mut historian = MemoryHistorian::new();
        let tagged = historian.add_window(EventWindow::closed("a", t(0), t(5)), "Batch");
        historian.add_window(EventWindow::closed("b", t(10), t(15)), "Batch");
        historian.set_extended_property(tagged, "phase", "steady");

        let selector = WindowSelector {
            template: "Batch".to_string(),
            extended_property: Some(("phase".to_string(), "steady".to_string())),
            mode: PopulationMode::ExtendedProperties,
            recent_count: None,
        };
        let windows = historian.find_windows(&selector).unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].name, "a");

        // Timeless match for classification follows the same property filter.
        let other = historian
            .find_window(historian.records[1].window.id, &selector)
            .unwrap()
            .unwrap();
        assert!(!other.matches_selector);
    }
}
