//! Change-driven control: poll, classify, and apply.
//!
//! A single worker drives the whole crate: each tick polls the change feed,
//! classifies what it finds, and runs either a fast append or a full
//! recomputation to completion before the next tick is scheduled. Because
//! the tick path is the only caller of the historian, the refresh-vs-query
//! exclusion holds without a lock.

use crate::core::windowing::EventWindow;
use crate::engine::{BoundsEngine, EngineError};
use crate::historian::{ChangeAction, ChangeCursor, EntityKind, Historian};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the reactor currently is in its tick cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Idle,
    Polling,
    Classifying,
    FastAppend,
    FullRecompute,
}

/// What a tick ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No matching changes
    Quiet,
    /// Work was applied
    Applied {
        fast_appends: usize,
        full_recompute: bool,
    },
}

/// Work derived from one poll batch.
struct TickPlan {
    /// Newly opened windows to re-anchor at, in feed order
    appends: Vec<EventWindow>,
    /// Whether the historical population changed
    full_recompute: bool,
}

/// Polls the change feed and drives the engine.
pub struct ChangeReactor<H: Historian> {
    engine: BoundsEngine<H>,
    cursor: ChangeCursor,
    state: ReactorState,
}

impl<H: Historian> ChangeReactor<H> {
    pub fn new(engine: BoundsEngine<H>) -> Self {
        Self {
            engine,
            cursor: ChangeCursor::default(),
            state: ReactorState::Idle,
        }
    }

    pub fn engine(&self) -> &BoundsEngine<H> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut BoundsEngine<H> {
        &mut self.engine
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    /// Run the initial full pass, then move the cursor to the present so
    /// the first tick only sees changes made after startup.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.engine.initial_run()?;
        let (_, cursor) = self.engine.historian().poll_changes(self.cursor)?;
        self.cursor = cursor;
        Ok(())
    }

    /// One poll cycle: fetch changes, classify, apply.
    ///
    /// The cursor advances only after the whole batch has been consumed;
    /// a failed tick leaves it in place so the next tick retries the batch
    /// wholesale. Recomputation is idempotent, so at-least-once is safe.
    pub fn tick(&mut self) -> Result<TickOutcome, EngineError> {
        self.state = ReactorState::Polling;
        let result = self.tick_inner();
        self.state = ReactorState::Idle;
        result
    }

    fn tick_inner(&mut self) -> Result<TickOutcome, EngineError> {
        let (changes, next_cursor) = self.engine.historian().poll_changes(self.cursor)?;
        if changes.is_empty() {
            self.cursor = next_cursor;
            return Ok(TickOutcome::Quiet);
        }

        self.state = ReactorState::Classifying;
        let plan = self.classify(&changes)?;

        // A full recompute supersedes everything already written; appends
        // run after it so their anchors are not clobbered.
        if plan.full_recompute {
            self.state = ReactorState::FullRecompute;
            self.engine.full_recompute()?;
        }
        let fast_appends = plan.appends.len();
        for window in &plan.appends {
            self.state = ReactorState::FastAppend;
            self.engine.fast_append(window)?;
        }

        self.cursor = next_cursor;

        if fast_appends == 0 && !plan.full_recompute {
            Ok(TickOutcome::Quiet)
        } else {
            info!(fast_appends, full_recompute = plan.full_recompute, "tick applied");
            Ok(TickOutcome::Applied {
                fast_appends,
                full_recompute: plan.full_recompute,
            })
        }
    }

    /// Classify a poll batch in feed order.
    ///
    /// Qualifying Updated/Removed changes collapse into a single full
    /// recompute per batch. A newly opened window triggers a fast append; a
    /// window that arrives already closed changed the historical population
    /// and recomputes instead. A Removed window that cannot be looked up
    /// anymore is treated as matching.
    fn classify(&self, changes: &[crate::historian::Change]) -> Result<TickPlan, EngineError> {
        let mut plan = TickPlan {
            appends: Vec::new(),
            full_recompute: false,
        };
        for change in changes {
            if change.entity_kind != EntityKind::Window {
                continue;
            }
            let window = self
                .engine
                .historian()
                .find_window(change.entity_id, self.engine.selector())?;
            match (change.action, window) {
                (ChangeAction::Added, Some(w)) if w.matches_selector && w.is_in_progress() => {
                    plan.appends.push(w);
                }
                (ChangeAction::Added, Some(w)) if w.matches_selector => {
                    plan.full_recompute = true;
                }
                (ChangeAction::Updated | ChangeAction::Removed, Some(w)) if w.matches_selector => {
                    plan.full_recompute = true;
                }
                (ChangeAction::Removed, None) => {
                    plan.full_recompute = true;
                }
                _ => {
                    debug!(entity = %change.entity_id, "change does not match selector, ignored");
                }
            }
        }
        Ok(plan)
    }

    /// Self-rescheduling poll loop; each tick runs to completion before the
    /// next is waited for (natural backpressure, no overlapping ticks).
    ///
    /// Returns when the shutdown channel fires or disconnects; the in-flight
    /// tick always finishes first. Store unavailability and rejected writes
    /// are retried on the next tick off the unadvanced cursor; a degenerate
    /// slice is a collaborator bug and aborts the loop.
    pub fn run(&mut self, shutdown: &Receiver<()>, poll_period: Duration) -> Result<(), EngineError> {
        loop {
            match shutdown.recv_timeout(poll_period) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("shutdown requested, poll loop stopping");
                    return Ok(());
                }
                Err(RecvTimeoutError::Timeout) => match self.tick() {
                    Ok(TickOutcome::Quiet) => {}
                    Ok(TickOutcome::Applied { .. }) => {}
                    Err(EngineError::Historian(e)) => {
                        warn!(error = %e, "tick aborted, will retry next poll");
                    }
                    Err(e @ EngineError::DegenerateSlice(_)) => return Err(e),
                },
            }
        }
    }
}
