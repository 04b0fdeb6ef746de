//! WorkflowEngine: drives each submitted query through the run state machine.
//!
//! Every run executes on its own task, owns its [`WorkflowRun`] exclusively
//! and publishes a snapshot after each change on a watch channel. Callers
//! only ever see those snapshots.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::aggregate;
use crate::captcha::{CaptchaError, CaptchaResolver, CaptchaSolver, TwoCaptchaSolver};
use crate::config::{JobflowConfig, WorkflowConfig};
use crate::enrichment;
use crate::error::{ErrorKind, FailureReason, JobflowError, ScrapeFailure};
use crate::interpreter::{
    HttpInterpretationService, InterpretError, InterpretationService, QueryInterpreter,
};
use crate::model::{JobListing, JobQuery, ParsedQuery};
use crate::registry::ServerRegistry;
use crate::rpc::{HttpTransport, RpcError, SubServiceClient, Transport};
use crate::state_machine::{RetryConfig, RunState, StateMachine, Transition, WorkflowRun};

/// Owns the collaborators shared by every run.
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    interpreter: QueryInterpreter,
    client: SubServiceClient,
    resolver: CaptchaResolver,
    retry: RetryConfig,
    workflow: WorkflowConfig,
    runs: DashMap<Uuid, RunSlot>,
}

struct RunSlot {
    snapshot: watch::Receiver<WorkflowRun>,
    cancel: CancellationToken,
}

#[derive(Debug, Deserialize)]
struct ScrapeReply {
    jobs: Vec<JobListing>,
}

impl WorkflowEngine {
    pub fn new(
        interpreter: QueryInterpreter,
        client: SubServiceClient,
        resolver: CaptchaResolver,
        retry: RetryConfig,
        workflow: WorkflowConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                interpreter,
                client,
                resolver,
                retry,
                workflow,
                runs: DashMap::new(),
            }),
        }
    }

    /// Engine wired to the HTTP sub-services, solver and interpretation
    /// service described by `config`.
    pub fn from_config(config: &JobflowConfig) -> Result<Self, JobflowError> {
        let registry = Arc::new(ServerRegistry::from_config(
            &config.services,
            config.workflow.registry_cooldown(),
        ));
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        let client = SubServiceClient::from_config(registry, transport, &config.services);

        let solver: Arc<dyn CaptchaSolver> = Arc::new(TwoCaptchaSolver::new(&config.captcha)?);
        let resolver = CaptchaResolver::new(solver, config.captcha.clone());

        let primary = HttpInterpretationService::from_config(&config.interpreter)?
            .map(|service| Arc::new(service) as Arc<dyn InterpretationService>);
        if primary.is_none() {
            info!("no interpretation endpoint configured, using the local heuristic only");
        }
        let interpreter = QueryInterpreter::new(primary, config.interpreter.timeout());

        Ok(Self::new(
            interpreter,
            client,
            resolver,
            config.retry.clone(),
            config.workflow.clone(),
        ))
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        self.inner.client.registry()
    }

    /// Start a run for `query` and return its id immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_query(&self, query: JobQuery) -> Uuid {
        let run = WorkflowRun::new(query);
        let id = run.id;
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(run.clone());
        let tx = Arc::new(tx);

        self.inner.runs.insert(
            id,
            RunSlot {
                snapshot: rx,
                cancel: cancel.clone(),
            },
        );

        let deadline = Instant::now() + self.inner.workflow.run_timeout();
        let driver = RunDriver {
            inner: Arc::clone(&self.inner),
            run,
            tx: Arc::clone(&tx),
            cancel,
            deadline,
        };

        tokio::spawn(
            async move {
                if AssertUnwindSafe(driver.drive()).catch_unwind().await.is_err() {
                    error!("run driver panicked");
                    tx.send_modify(|run| {
                        StateMachine::fail(
                            run,
                            FailureReason::Internal {
                                message: "run driver panicked".to_string(),
                            },
                        )
                    });
                }
            }
            .instrument(info_span!("run", run_id = %id)),
        );

        id
    }

    /// Latest snapshot of run `id`.
    pub fn get_run_status(&self, id: Uuid) -> Result<WorkflowRun, JobflowError> {
        self.inner
            .runs
            .get(&id)
            .map(|slot| slot.snapshot.borrow().clone())
            .ok_or_else(|| JobflowError::RunNotFound(id.to_string()))
    }

    /// Watch channel carrying every snapshot of run `id`.
    pub fn subscribe(&self, id: Uuid) -> Result<watch::Receiver<WorkflowRun>, JobflowError> {
        self.inner
            .runs
            .get(&id)
            .map(|slot| slot.snapshot.clone())
            .ok_or_else(|| JobflowError::RunNotFound(id.to_string()))
    }

    /// Ask run `id` to stop. Returns `false` if it had already finished.
    pub fn cancel(&self, id: Uuid) -> Result<bool, JobflowError> {
        let slot = self
            .inner
            .runs
            .get(&id)
            .ok_or_else(|| JobflowError::RunNotFound(id.to_string()))?;
        if slot.snapshot.borrow().is_terminal() {
            return Ok(false);
        }
        info!(run_id = %id, "cancellation requested");
        slot.cancel.cancel();
        Ok(true)
    }

    /// Wait until run `id` is terminal and return its final snapshot.
    pub async fn wait(&self, id: Uuid) -> Result<WorkflowRun, JobflowError> {
        let mut rx = self.subscribe(id)?;
        let finished = rx
            .wait_for(WorkflowRun::is_terminal)
            .await
            .map(|run| run.clone());
        // A closed channel still holds the last snapshot the driver sent.
        Ok(finished.unwrap_or_else(|_| rx.borrow().clone()))
    }

    /// Run `query` to completion and hand back the archived run.
    pub async fn execute(&self, query: JobQuery) -> Result<WorkflowRun, JobflowError> {
        let id = self.submit_query(query);
        let run = self.wait(id).await?;
        self.inner.runs.remove(&id);
        Ok(run)
    }

    /// Remove a terminal run from the engine and return it.
    /// `Ok(None)` while the run is still in progress.
    pub fn take_finished(&self, id: Uuid) -> Result<Option<WorkflowRun>, JobflowError> {
        if let Some((_, slot)) = self
            .inner
            .runs
            .remove_if(&id, |_, slot| slot.snapshot.borrow().is_terminal())
        {
            let run = slot.snapshot.borrow().clone();
            return Ok(Some(run));
        }
        if self.inner.runs.contains_key(&id) {
            Ok(None)
        } else {
            Err(JobflowError::RunNotFound(id.to_string()))
        }
    }

    /// Ids of every run the engine still holds.
    pub fn run_ids(&self) -> Vec<Uuid> {
        self.inner.runs.iter().map(|entry| *entry.key()).collect()
    }
}

/// Per-run task state. The only writer of its [`WorkflowRun`].
struct RunDriver {
    inner: Arc<EngineInner>,
    run: WorkflowRun,
    tx: Arc<watch::Sender<WorkflowRun>>,
    cancel: CancellationToken,
    deadline: Instant,
}

impl RunDriver {
    async fn drive(mut self) {
        let watchdog = {
            let cancel = self.cancel.clone();
            let deadline = self.deadline;
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        warn!("run exceeded its wall-clock budget, cancelling");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        };

        info!(query = %self.run.query.raw, "run started");
        if let Err(reason) = self.pipeline().await {
            self.fail(reason);
        }
        watchdog.abort();

        match &self.run.failure {
            None => info!(
                duration_ms = self.run.duration_ms(),
                listings = self.run.listings.len(),
                "run completed"
            ),
            Some(failure) => info!(
                duration_ms = self.run.duration_ms(),
                last_good_state = %failure.last_good_state,
                reason = %failure.reason,
                "run failed"
            ),
        }
    }

    async fn pipeline(&mut self) -> Result<(), FailureReason> {
        self.advance(RunState::Parsing)?;
        let parsed = self.parse().await?;

        self.advance(RunState::Validating)?;
        self.validate(&parsed)?;

        self.advance(RunState::Scraping)?;
        let listings = self.scrape(&parsed).await?;
        self.run.listings = listings;
        self.publish();

        if self.run.listings.is_empty() {
            info!("no listings scraped, skipping enrichment");
        } else {
            self.advance(RunState::Enriching)?;
            self.enrich(&parsed).await?;
        }

        self.advance(RunState::Aggregating)?;
        self.checkpoint()?;
        let output = aggregate::aggregate(&parsed, &self.run.listings, &self.run.enrichment);
        debug!(
            total = output.summary.total_listings,
            fully_enriched = output.summary.fully_enriched,
            "listings aggregated"
        );
        self.run.output = Some(output);

        self.advance(RunState::Completed)
    }

    async fn parse(&mut self) -> Result<ParsedQuery, FailureReason> {
        self.checkpoint()?;
        let parsed = match self
            .inner
            .interpreter
            .interpret(&self.run.query, &self.cancel)
            .await
        {
            Ok(parsed) => parsed,
            Err(InterpretError::Cancelled) => return Err(self.cancelled()),
            Err(InterpretError::InterpretationFailed {
                message,
                suggestions,
            }) => {
                return Err(FailureReason::InterpretationFailed {
                    message,
                    suggestions,
                });
            }
        };

        info!(
            title = %parsed.title,
            location = %parsed.location,
            confidence = parsed.confidence,
            source = %parsed.source,
            low_confidence = parsed.low_confidence,
            "query interpreted"
        );
        self.run.parsed = Some(parsed.clone());
        self.publish();
        Ok(parsed)
    }

    fn validate(&self, parsed: &ParsedQuery) -> Result<(), FailureReason> {
        let threshold = self.inner.workflow.confidence_threshold;
        if parsed.confidence < threshold {
            return Err(FailureReason::LowConfidenceQuery {
                confidence: parsed.confidence,
                threshold,
            });
        }
        Ok(())
    }

    /// One scrape per attempt, each with a fresh session. Only `Timeout`
    /// and `Unreachable` are retried.
    async fn scrape(&mut self, parsed: &ParsedQuery) -> Result<Vec<JobListing>, FailureReason> {
        let retry = self.inner.retry.clone();
        let max_results = self
            .run
            .query
            .max_results
            .unwrap_or(self.inner.workflow.max_results);

        loop {
            self.checkpoint()?;
            self.run.scrape_attempts += 1;
            let attempt = self.run.scrape_attempts;
            let session_id = Uuid::new_v4();
            debug!(attempt, session_id = %session_id, "scrape attempt");

            let payload = json!({
                "title": parsed.title,
                "location": parsed.location,
                "max_results": max_results,
                "session_id": session_id.to_string(),
            });
            let result = self
                .inner
                .resolver
                .scrape(&self.inner.client, payload, &self.cancel)
                .await;

            let err = match result {
                Ok(outcome) => {
                    self.run.captcha_attempts += outcome.attempts;
                    let reply: ScrapeReply =
                        serde_json::from_value(outcome.data).map_err(|e| {
                            FailureReason::ScrapeFailed {
                                cause: ScrapeFailure::Malformed {
                                    message: e.to_string(),
                                },
                            }
                        })?;
                    let mut listings = reply.jobs;
                    listings.truncate(max_results as usize);
                    info!(listings = listings.len(), attempt, "scrape succeeded");
                    return Ok(listings);
                }
                Err(e) => {
                    self.run.captcha_attempts += e.attempts();
                    e
                }
            };

            let rpc = match err {
                CaptchaError::Cancelled { .. } => return Err(self.cancelled()),
                CaptchaError::CaptchaUnsolved { attempts } => {
                    return Err(FailureReason::ScrapeFailed {
                        cause: ScrapeFailure::CaptchaUnsolved { attempts },
                    });
                }
                CaptchaError::SolveSubmissionFailed { message, .. } => {
                    return Err(FailureReason::ScrapeFailed {
                        cause: ScrapeFailure::SolveSubmissionFailed { message },
                    });
                }
                CaptchaError::Scrape { source, .. } => source,
            };

            if !rpc.is_transient() {
                return Err(FailureReason::ScrapeFailed {
                    cause: permanent_scrape_failure(&rpc),
                });
            }
            if attempt > retry.max_retries {
                return Err(FailureReason::ScrapeFailed {
                    cause: ScrapeFailure::RetriesExhausted {
                        attempts: attempt,
                        last_kind: rpc.kind(),
                        last_error: rpc.to_string(),
                    },
                });
            }

            let delay_ms = retry.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_retries = retry.max_retries,
                delay_ms,
                error = %rpc,
                "scrape failed, retrying"
            );
            self.transition(Transition::Retry {
                kind: rpc.kind(),
                message: rpc.to_string(),
            })?;

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                _ = sleep(Duration::from_millis(delay_ms)) => {}
            }
        }
    }

    async fn enrich(&mut self, parsed: &ParsedQuery) -> Result<(), FailureReason> {
        self.checkpoint()?;
        let keys = enrichment::distinct_keys(&self.run.listings, parsed);
        let deadline = Instant::now() + self.inner.workflow.enrichment_timeout();
        debug!(keys = keys.len(), "enriching listings");

        let Some(outcome) =
            enrichment::enrich(&self.inner.client, &keys, deadline, &self.cancel).await
        else {
            return Err(self.cancelled());
        };

        for degradation in &outcome.degraded {
            self.run.record_error(
                ErrorKind::EnrichmentDegraded,
                format!(
                    "{} unavailable for {}: {}",
                    degradation.service, degradation.key, degradation.reason
                ),
            );
        }
        self.run.enrichment = outcome.results;
        self.publish();
        Ok(())
    }

    fn advance(&mut self, next: RunState) -> Result<(), FailureReason> {
        let from = self.run.state;
        self.transition(Transition::Next(next))?;
        info!(from = %from, to = %next, "state transition");
        Ok(())
    }

    fn transition(&mut self, transition: Transition) -> Result<(), FailureReason> {
        StateMachine::apply(&mut self.run, transition).map_err(|e| {
            error!(error = %e, state = %self.run.state, "illegal state transition");
            FailureReason::Internal {
                message: e.to_string(),
            }
        })?;
        self.publish();
        Ok(())
    }

    fn fail(&mut self, reason: FailureReason) {
        match &reason {
            FailureReason::Internal { message } => {
                error!(state = %self.run.state, message = %message, "internal failure")
            }
            other => warn!(state = %self.run.state, reason = %other, "run failing"),
        }
        StateMachine::fail(&mut self.run, reason);
        self.publish();
    }

    fn checkpoint(&self) -> Result<(), FailureReason> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    fn cancelled(&self) -> FailureReason {
        let message = if Instant::now() >= self.deadline {
            format!(
                "run exceeded its wall-clock budget of {} ms",
                self.inner.workflow.run_timeout_ms
            )
        } else {
            "cancelled by caller".to_string()
        };
        FailureReason::Cancelled { message }
    }

    fn publish(&self) {
        self.tx.send_replace(self.run.clone());
    }
}

fn permanent_scrape_failure(err: &RpcError) -> ScrapeFailure {
    match err.kind() {
        ErrorKind::Rejected => ScrapeFailure::Rejected {
            message: err.to_string(),
        },
        _ => ScrapeFailure::Malformed {
            message: err.to_string(),
        },
    }
}
