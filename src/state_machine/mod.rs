mod run;
mod state;

pub use run::{FailureRecord, RetryConfig, RunFailure, StateEntry, WorkflowRun};
pub use state::{RunState, StateMachine, Transition, TransitionError};
