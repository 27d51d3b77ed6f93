//! Framelimits - statistical control limits for event-window sensor data.
//!
//! This library maintains control bounds (and summary trends) for a sensor
//! signal by aggregating data across a population of discrete, time-bounded
//! event windows, and keeps those bounds current as the population changes.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Framelimits                           │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌─────────┐  ┌────────┐  ┌───────┐  ┌───────┐ │
//! │  │Historian │─▶│ Extract │─▶│ Align  │─▶│ Stats │─▶│Bounds │ │
//! │  │ (windows)│  │ (trends)│  │(slices)│  │(μ, σ) │  │(μ±3σ) │ │
//! │  └──────────┘  └─────────┘  └────────┘  └───────┘  └───┬───┘ │
//! │        ▲                                               ▼     │
//! │  ┌──────────┐                                    ┌─────────┐ │
//! │  │ Change   │                                    │ Project │ │
//! │  │ Reactor  │──────────── anchors ──────────────▶│ / Write │ │
//! │  └──────────┘                                    └─────────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The change reactor polls the historian's change feed on a fixed period.
//! A newly opened window only re-anchors the already-computed bounds (fast
//! append); any change to the historical population triggers a full
//! recomputation of the pipeline.
//!
//! # Example
//!
//! ```no_run
//! use framelimits::{BoundsEngine, ChangeReactor, EngineSettings, MemoryHistorian};
//! use framelimits::config::Config;
//!
//! let config = Config::load().expect("config");
//! config.validate().expect("valid config");
//!
//! let historian = MemoryHistorian::new();
//! let engine = BoundsEngine::new(historian, EngineSettings::from_config(&config));
//! let mut reactor = ChangeReactor::new(engine);
//! reactor.start().expect("initial run");
//! ```

pub mod config;
pub mod core;
pub mod engine;
pub mod historian;
pub mod reactor;

// Re-export key types at crate root for convenience
pub use config::{BoundOutput, Config, ConfigError};
pub use core::{
    align, compute_bound, summarize, BadSamplePolicy, BoundFormula, BoundSeries,
    DegenerateSliceError, EventWindow, Quality, Sample, Series, Slice, SliceStatistics,
    TrendExtractor,
};
pub use engine::{BoundsEngine, EngineError, EngineSettings, OutputSpec};
pub use historian::{
    AttributeRef, Change, ChangeAction, ChangeCursor, EntityKind, Historian, HistorianError,
    MemoryHistorian, PopulationMode, TimeRange, WindowSelector, WriteMode,
};
pub use reactor::{ChangeReactor, ReactorState, TickOutcome};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
