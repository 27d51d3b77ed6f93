//! Collaborator surface for the external time-series store.
//!
//! The engine consumes the historian through this trait only: window lookup
//! by selector, fixed-interval interpolated reads, a cursor-based change
//! feed, and series/sentinel writes. Connection management, path resolution
//! syntax, and retry policy all live behind the implementation.

pub mod memory;

use crate::core::windowing::{EventWindow, Series};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemoryHistorian;

/// Reference to a named attribute in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRef(pub String);

impl AttributeRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl std::fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Which part of the matching population to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationMode {
    /// The most recent matching windows only
    Recent,
    /// Windows carrying the configured extended property
    ExtendedProperties,
    /// Union of both
    Both,
}

/// Selection rule for the window population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSelector {
    /// Template name the windows must be built from
    pub template: String,
    /// Extended property `(key, value)` filter, when the mode uses one
    pub extended_property: Option<(String, String)>,
    /// Population mode
    pub mode: PopulationMode,
    /// Cap on the number of recent windows fetched, newest first
    pub recent_count: Option<usize>,
}

impl WindowSelector {
    /// Selector matching the newest `count` windows of a template.
    pub fn recent(template: impl Into<String>, count: usize) -> Self {
        Self {
            template: template.into(),
            extended_property: None,
            mode: PopulationMode::Recent,
            recent_count: Some(count),
        }
    }
}

/// Kind of entity a change record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Window,
    Attribute,
    Other,
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Added,
    Updated,
    Removed,
}

/// One record from the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub entity_kind: EntityKind,
    pub action: ChangeAction,
    pub entity_id: Uuid,
}

/// Opaque bookmark into the change feed. Advances monotonically; owned
/// exclusively by the change reactor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeCursor(pub u64);

/// How written values interact with existing attribute history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Add values without disturbing history outside the written span
    Insert,
    /// The attribute's prior history may be overwritten wholesale
    Replace,
}

/// Errors surfaced by a historian implementation.
#[derive(Debug, Clone)]
pub enum HistorianError {
    /// The store could not be reached; the current tick should abort
    SourceUnavailable(String),
    /// A named attribute does not resolve
    AttributeNotFound(String),
    /// A window time range cannot be read
    MalformedRange(String),
    /// The store rejected a write
    RejectedWrite(String),
}

impl std::fmt::Display for HistorianError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HistorianError::SourceUnavailable(e) => write!(f, "source unavailable: {e}"),
            HistorianError::AttributeNotFound(e) => write!(f, "attribute not found: {e}"),
            HistorianError::MalformedRange(e) => write!(f, "malformed time range: {e}"),
            HistorianError::RejectedWrite(e) => write!(f, "write rejected: {e}"),
        }
    }
}

impl std::error::Error for HistorianError {}

/// Store operations the engine depends on.
///
/// Reads take `&self`; only writes mutate. With the single-worker model the
/// reactor's tick path is the sole caller, so the refresh-vs-query exclusion
/// from the design holds by construction.
pub trait Historian {
    /// Check that an attribute path resolves. Called once at startup;
    /// failure is fatal configuration, not something to recover from.
    fn resolve_attribute(&self, attribute: &AttributeRef) -> Result<(), HistorianError>;

    /// All windows matching the selector, oldest first.
    fn find_windows(&self, selector: &WindowSelector) -> Result<Vec<EventWindow>, HistorianError>;

    /// Look up one window by id; `None` when it no longer exists.
    ///
    /// `matches_selector` on the returned window is evaluated against the
    /// given selector with its time and in-progress filters stripped, so a
    /// change to a window outside the current population still classifies
    /// correctly.
    fn find_window(
        &self,
        id: Uuid,
        selector: &WindowSelector,
    ) -> Result<Option<EventWindow>, HistorianError>;

    /// Fixed-interval interpolated samples for an attribute over a range,
    /// endpoints inclusive.
    fn interpolated_series(
        &self,
        attribute: &AttributeRef,
        range: TimeRange,
        interval: Duration,
    ) -> Result<Series, HistorianError>;

    /// Changes recorded after the cursor, in feed order, plus the cursor to
    /// resume from once the batch has been consumed.
    fn poll_changes(
        &self,
        cursor: ChangeCursor,
    ) -> Result<(Vec<Change>, ChangeCursor), HistorianError>;

    /// Write a timestamped series to an attribute.
    fn write_series(
        &mut self,
        attribute: &AttributeRef,
        values: &[(f64, DateTime<Utc>)],
        mode: WriteMode,
    ) -> Result<(), HistorianError>;

    /// Write the "no data" marker terminating a series.
    fn write_sentinel(
        &mut self,
        attribute: &AttributeRef,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HistorianError>;
}
