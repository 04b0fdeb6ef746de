use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::run::{RunFailure, StateEntry, WorkflowRun};
use crate::error::{ErrorKind, FailureReason};

/// States of a workflow run.
///
/// Each run flows through: CREATED → PARSING → VALIDATING → SCRAPING →
/// ENRICHING → AGGREGATING → COMPLETED, or stops at FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Parsing,
    Validating,
    Scraping,
    Enriching,
    Aggregating,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// States reachable by a forward transition.
    fn successors(self) -> &'static [RunState] {
        match self {
            RunState::Created => &[RunState::Parsing],
            RunState::Parsing => &[RunState::Validating],
            RunState::Validating => &[RunState::Scraping],
            // An empty listing set has nothing to enrich.
            RunState::Scraping => &[RunState::Enriching, RunState::Aggregating],
            RunState::Enriching => &[RunState::Aggregating],
            RunState::Aggregating => &[RunState::Completed],
            RunState::Completed | RunState::Failed => &[],
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Created => write!(f, "CREATED"),
            RunState::Parsing => write!(f, "PARSING"),
            RunState::Validating => write!(f, "VALIDATING"),
            RunState::Scraping => write!(f, "SCRAPING"),
            RunState::Enriching => write!(f, "ENRICHING"),
            RunState::Aggregating => write!(f, "AGGREGATING"),
            RunState::Completed => write!(f, "COMPLETED"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

/// A requested change to a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Advance to the next state.
    Next(RunState),
    /// Stay in the current state after a transient failure.
    Retry { kind: ErrorKind, message: String },
    /// Terminate the run with a typed reason.
    Fail(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to}")]
    Illegal { from: RunState, to: RunState },

    #[error("retry is only allowed while scraping, not in {state}")]
    RetryOutsideScraping { state: RunState },

    #[error("run is already terminal ({state})")]
    Terminal { state: RunState },
}

/// The only code that mutates a run's state.
pub struct StateMachine;

impl StateMachine {
    /// Apply `transition` to `run`.
    ///
    /// - `Next` must follow the forward order; states are never revisited.
    /// - `Retry` records the failure and keeps the run where it is; only the
    ///   scraping stage retries.
    /// - `Fail` records the reason with the state the run had reached.
    ///
    /// Terminal runs accept nothing.
    pub fn apply(run: &mut WorkflowRun, transition: Transition) -> Result<(), TransitionError> {
        if run.state.is_terminal() {
            return Err(TransitionError::Terminal { state: run.state });
        }

        match transition {
            Transition::Next(next) => {
                if !run.state.successors().contains(&next) {
                    return Err(TransitionError::Illegal {
                        from: run.state,
                        to: next,
                    });
                }
                Self::enter(run, next);
            }
            Transition::Retry { kind, message } => {
                if run.state != RunState::Scraping {
                    return Err(TransitionError::RetryOutsideScraping { state: run.state });
                }
                run.record_error(kind, message);
            }
            Transition::Fail(reason) => {
                run.record_error(reason.kind(), reason.to_string());
                run.failure = Some(RunFailure {
                    reason,
                    last_good_state: run.state,
                });
                Self::enter(run, RunState::Failed);
            }
        }
        Ok(())
    }

    /// Convenience for `apply(run, Transition::Next(next))`.
    pub fn advance(run: &mut WorkflowRun, next: RunState) -> Result<(), TransitionError> {
        Self::apply(run, Transition::Next(next))
    }

    /// Fail the run. No-op once the run is terminal.
    pub fn fail(run: &mut WorkflowRun, reason: FailureReason) {
        if run.state.is_terminal() {
            return;
        }
        // Fail is legal from every non-terminal state.
        let _ = Self::apply(run, Transition::Fail(reason));
    }

    fn enter(run: &mut WorkflowRun, state: RunState) {
        let now = Utc::now();
        run.state = state;
        run.history.push(StateEntry {
            state,
            entered_at: now,
        });
        run.updated_at = now;
    }
}
