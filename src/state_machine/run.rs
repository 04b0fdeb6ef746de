use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::RunState;
use crate::aggregate::RunOutput;
use crate::error::{ErrorKind, FailureCategory, FailureReason};
use crate::model::{EnrichmentResult, JobListing, JobQuery, ParsedQuery};

/// Configuration for retry behavior of the scraping stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt before the stage gives up.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay for a given retry attempt using exponential backoff.
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Worst-case total backoff if every retry is used.
    pub fn total_backoff_ms(&self) -> u64 {
        (1..=self.max_retries)
            .map(|attempt| self.delay_for_attempt(attempt))
            .fold(0u64, u64::saturating_add)
    }
}

/// One entry in a run's error history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub state: RunState,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: RunState,
    pub entered_at: DateTime<Utc>,
}

/// Why a run ended in `Failed`, and how far it got.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub reason: FailureReason,
    pub last_good_state: RunState,
}

impl RunFailure {
    pub fn category(&self) -> FailureCategory {
        self.reason.category()
    }
}

/// A single query's journey through the workflow.
///
/// Owned by the engine task driving it; callers only ever see clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub query: JobQuery,
    pub state: RunState,
    pub parsed: Option<ParsedQuery>,
    pub listings: Vec<JobListing>,
    pub enrichment: Vec<EnrichmentResult>,
    pub output: Option<RunOutput>,
    pub errors: Vec<FailureRecord>,
    pub history: Vec<StateEntry>,
    /// Scrape calls made, retries included.
    pub scrape_attempts: u32,
    /// CAPTCHA solve attempts across all scrape calls.
    pub captcha_attempts: u32,
    pub failure: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(query: JobQuery) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query,
            state: RunState::Created,
            parsed: None,
            listings: Vec::new(),
            enrichment: Vec::new(),
            output: None,
            errors: Vec::new(),
            history: vec![StateEntry {
                state: RunState::Created,
                entered_at: now,
            }],
            scrape_attempts: 0,
            captcha_attempts: 0,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn record_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        let now = Utc::now();
        self.errors.push(FailureRecord {
            state: self.state,
            kind,
            message: message.into(),
            at: now,
        });
        self.updated_at = now;
    }

    /// When the run entered `state`, if it ever did.
    pub fn entered_at(&self, state: RunState) -> Option<DateTime<Utc>> {
        self.history
            .iter()
            .find(|entry| entry.state == state)
            .map(|entry| entry.entered_at)
    }

    pub fn states(&self) -> Vec<RunState> {
        self.history.iter().map(|entry| entry.state).collect()
    }

    pub fn duration_ms(&self) -> i64 {
        (self.updated_at - self.created_at).num_milliseconds()
    }
}
