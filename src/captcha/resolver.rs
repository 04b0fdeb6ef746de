use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CaptchaChallenge, CaptchaSolver, CaptchaState, PollStatus};
use crate::config::{CaptchaConfig, SCRAPING};
use crate::rpc::{RpcError, SubServiceClient};

pub const SCRAPE_OPERATION: &str = "scrape_jobs";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptchaError {
    #[error("challenge could not be submitted: {message}")]
    SolveSubmissionFailed { message: String, attempts: u32 },

    #[error("challenge unsolved after {attempts} attempt(s)")]
    CaptchaUnsolved { attempts: u32 },

    #[error("cancelled while handling the scrape")]
    Cancelled { attempts: u32 },

    /// The scrape call itself failed for a reason other than a challenge.
    /// `attempts` counts solves already spent before the failing call.
    #[error("{source}")]
    Scrape { source: RpcError, attempts: u32 },
}

impl CaptchaError {
    pub fn attempts(&self) -> u32 {
        match self {
            CaptchaError::SolveSubmissionFailed { attempts, .. }
            | CaptchaError::CaptchaUnsolved { attempts }
            | CaptchaError::Cancelled { attempts }
            | CaptchaError::Scrape { attempts, .. } => *attempts,
        }
    }
}

/// Successful scrape response plus how it was obtained.
#[derive(Debug, Clone)]
pub struct CaptchaOutcome {
    pub data: Value,
    /// Solve attempts spent; 0 when no challenge was raised.
    pub attempts: u32,
    /// Every state the resolver passed through, starting at `Idle`.
    pub trace: Vec<CaptchaState>,
}

/// Wraps one scraping attempt: detect a challenge, get it solved, re-submit
/// the token, hand back the challenge-free response.
///
/// The attempt counter spans every challenge raised during the attempt and
/// never exceeds `max_attempts`. Each challenge gets its own wall-clock
/// polling budget.
pub struct CaptchaResolver {
    solver: Arc<dyn CaptchaSolver>,
    config: CaptchaConfig,
}

struct Attempt {
    state: CaptchaState,
    attempts: u32,
    trace: Vec<CaptchaState>,
}

impl Attempt {
    fn enter(&mut self, state: CaptchaState) {
        debug!(from = %self.state, to = %state, attempts = self.attempts, "captcha transition");
        self.state = state;
        self.trace.push(state);
    }
}

enum PollEnd {
    Solved(String),
    /// The service gave up on this submission; another may be tried.
    Failed(String),
    OutOfTime,
}

impl CaptchaResolver {
    pub fn new(solver: Arc<dyn CaptchaSolver>, config: CaptchaConfig) -> Self {
        Self { solver, config }
    }

    /// Call `scrape_jobs` with `payload`, solving any challenges raised on
    /// the way. `payload` must be a JSON object; the solved token is added
    /// to it as `captcha_token`.
    pub async fn scrape(
        &self,
        client: &SubServiceClient,
        payload: Value,
        cancel: &CancellationToken,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        let mut attempt = Attempt {
            state: CaptchaState::Idle,
            attempts: 0,
            trace: vec![CaptchaState::Idle],
        };
        let mut solved_token: Option<String> = None;

        loop {
            let mut request = payload.clone();
            if let (Some(token), Some(fields)) = (&solved_token, request.as_object_mut()) {
                fields.insert("captcha_token".to_string(), Value::String(token.clone()));
            }

            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CaptchaError::Cancelled { attempts: attempt.attempts });
                }
                response = client.call(SCRAPING, SCRAPE_OPERATION, request, None) => response,
            };

            match response {
                Ok(data) => {
                    if solved_token.is_some() {
                        info!(attempts = attempt.attempts, "scrape succeeded after solving challenge");
                    }
                    return Ok(CaptchaOutcome {
                        data,
                        attempts: attempt.attempts,
                        trace: attempt.trace,
                    });
                }
                Err(RpcError::Challenge { service, detail }) => {
                    attempt.enter(CaptchaState::ChallengeDetected);
                    let mut challenge =
                        CaptchaChallenge::from_detail(&detail).map_err(|message| {
                            CaptchaError::Scrape {
                                source: RpcError::Malformed { service, message },
                                attempts: attempt.attempts,
                            }
                        })?;
                    solved_token = Some(self.solve(&mut challenge, &mut attempt, cancel).await?);
                    attempt.enter(CaptchaState::Solved);
                }
                Err(source) => {
                    return Err(CaptchaError::Scrape {
                        source,
                        attempts: attempt.attempts,
                    });
                }
            }
        }
    }

    async fn solve(
        &self,
        challenge: &mut CaptchaChallenge,
        attempt: &mut Attempt,
        cancel: &CancellationToken,
    ) -> Result<String, CaptchaError> {
        let deadline = Instant::now() + self.config.poll_budget();

        while attempt.attempts < self.config.max_attempts {
            attempt.attempts += 1;
            challenge.attempts = attempt.attempts;
            attempt.enter(CaptchaState::SolutionRequested);

            let submitted = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CaptchaError::Cancelled { attempts: attempt.attempts });
                }
                submitted = self.solver.submit(challenge) => submitted,
            };
            let ticket = submitted.map_err(|e| {
                warn!(error = %e, attempts = attempt.attempts, "challenge submission failed");
                CaptchaError::SolveSubmissionFailed {
                    message: e.to_string(),
                    attempts: attempt.attempts,
                }
            })?;

            attempt.enter(CaptchaState::SolutionPolling);
            match self.poll_until(&ticket, deadline, cancel).await {
                Ok(PollEnd::Solved(token)) => return Ok(token),
                Ok(PollEnd::Failed(reason)) => {
                    warn!(ticket = %ticket, reason = %reason, attempts = attempt.attempts, "solving service gave up");
                }
                Ok(PollEnd::OutOfTime) => {
                    warn!(ticket = %ticket, attempts = attempt.attempts, "challenge polling budget exhausted");
                    break;
                }
                Err(()) => {
                    return Err(CaptchaError::Cancelled {
                        attempts: attempt.attempts,
                    });
                }
            }
        }

        attempt.enter(CaptchaState::Exhausted);
        Err(CaptchaError::CaptchaUnsolved {
            attempts: attempt.attempts,
        })
    }

    // Err(()) means cancelled.
    async fn poll_until(
        &self,
        ticket: &str,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<PollEnd, ()> {
        let interval = self.config.poll_interval();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(()),
                _ = tokio::time::sleep(interval) => {}
            }
            if Instant::now() > deadline {
                return Ok(PollEnd::OutOfTime);
            }

            let polled = tokio::select! {
                _ = cancel.cancelled() => return Err(()),
                polled = self.solver.poll(ticket) => polled,
            };
            match polled {
                Ok(PollStatus::Pending) => {}
                Ok(PollStatus::Solved(token)) => return Ok(PollEnd::Solved(token)),
                Ok(PollStatus::Failed(reason)) => return Ok(PollEnd::Failed(reason)),
                Err(e) if e.is_transient() => {
                    debug!(error = %e, "poll failed, retrying on next tick");
                }
                Err(e) => return Ok(PollEnd::Failed(e.to_string())),
            }
        }
    }
}
