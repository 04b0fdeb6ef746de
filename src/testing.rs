//! Scripted in-memory collaborators for tests.
//!
//! Each fake is driven by a closure receiving the request and how many
//! calls that collaborator has already seen, and records every call so
//! tests can assert on what was sent.

use std::collections::HashMap;
use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::captcha::{CaptchaChallenge, CaptchaSolver, PollStatus, SolverError};
use crate::interpreter::{
    InterpretationRequest, InterpretationResponse, InterpretationService,
    InterpretationServiceError,
};
use crate::registry::Endpoint;
use crate::rpc::{RpcRequest, Transport, TransportError, TransportReply};

/// What a scripted sub-service does with one request.
pub enum Step {
    /// Reply 200 with this envelope.
    Reply(Value),
    /// Reply 200 with this raw body.
    Raw(String),
    /// Reply with a bare HTTP status and body.
    Status(u16, String),
    Fail(TransportError),
    /// Never answer.
    Hang,
}

pub fn envelope_ok(data: Value) -> Value {
    json!({"status": "ok", "data": data})
}

pub fn envelope_err(code: &str) -> Value {
    json!({"status": "error", "error_code": code, "message": format!("scripted {code}")})
}

pub fn envelope_challenge(token: &str) -> Value {
    json!({
        "status": "error",
        "error_code": "challenge",
        "data": {
            "challenge_type": "turnstile",
            "token": token,
            "payload": {"sitekey": "0x4AAAA", "page_url": "https://jobs.example/search"}
        }
    })
}

/// `{jobs: [...]}` with `n` listings for `title` in `location`.
pub fn jobs_payload(title: &str, location: &str, n: usize) -> Value {
    let jobs: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "title": title,
                "company": format!("Company {i}"),
                "location": location,
                "salary_range": "$50 - $60 an hour",
                "url": format!("https://jobs.example/{i}"),
                "scraped_at": "2026-01-01T00:00:00Z"
            })
        })
        .collect();
    json!({ "jobs": jobs })
}

type TransportHandler = Arc<dyn Fn(&RpcRequest, usize) -> Step + Send + Sync>;

#[derive(Default)]
pub struct ScriptedTransport {
    handlers: Mutex<HashMap<String, TransportHandler>>,
    calls: Mutex<Vec<(String, RpcRequest)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the sub-service registered as `service`.
    pub fn on(
        &self,
        service: &str,
        handler: impl Fn(&RpcRequest, usize) -> Step + Send + Sync + 'static,
    ) {
        self.handlers
            .lock()
            .unwrap()
            .insert(service.to_string(), Arc::new(handler));
    }

    pub fn calls(&self, service: &str) -> Vec<RpcRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == service)
            .map(|(_, request)| request.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &RpcRequest,
    ) -> Result<TransportReply, TransportError> {
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            let seen = calls.iter().filter(|(name, _)| *name == endpoint.name).count();
            calls.push((endpoint.name.clone(), request.clone()));
            seen
        };
        let handler = self.handlers.lock().unwrap().get(&endpoint.name).cloned();
        let Some(handler) = handler else {
            return Err(TransportError::Connect(format!("no script for {}", endpoint.name)));
        };

        match handler(request, seen) {
            Step::Reply(envelope) => Ok(TransportReply::ok(envelope.to_string())),
            Step::Raw(body) => Ok(TransportReply::ok(body)),
            Step::Status(status, body) => Ok(TransportReply { status, body }),
            Step::Fail(err) => Err(err),
            Step::Hang => pending().await,
        }
    }
}

type SubmitHandler = Arc<dyn Fn(&CaptchaChallenge, usize) -> Result<String, SolverError> + Send + Sync>;
type PollHandler = Arc<dyn Fn(&str, usize) -> Result<PollStatus, SolverError> + Send + Sync>;

/// Solving service whose submit and poll answers are scripted.
pub struct ScriptedSolver {
    submit: SubmitHandler,
    poll: PollHandler,
    submitted: Mutex<Vec<CaptchaChallenge>>,
    polls: Mutex<usize>,
}

impl ScriptedSolver {
    pub fn new(
        submit: impl Fn(&CaptchaChallenge, usize) -> Result<String, SolverError> + Send + Sync + 'static,
        poll: impl Fn(&str, usize) -> Result<PollStatus, SolverError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            submit: Arc::new(submit),
            poll: Arc::new(poll),
            submitted: Mutex::new(Vec::new()),
            polls: Mutex::new(0),
        })
    }

    /// Accepts every submission and solves on the `solve_on`-th poll (0-based).
    pub fn solving_after(solve_on: usize) -> Arc<Self> {
        Self::new(
            |_, n| Ok(format!("ticket-{n}")),
            move |_, n| {
                if n >= solve_on {
                    Ok(PollStatus::Solved("solved-token".into()))
                } else {
                    Ok(PollStatus::Pending)
                }
            },
        )
    }

    pub fn never_solving() -> Arc<Self> {
        Self::new(|_, n| Ok(format!("ticket-{n}")), |_, _| Ok(PollStatus::Pending))
    }

    pub fn submissions(&self) -> Vec<CaptchaChallenge> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl CaptchaSolver for ScriptedSolver {
    async fn submit(&self, challenge: &CaptchaChallenge) -> Result<String, SolverError> {
        let seen = {
            let mut submitted = self.submitted.lock().unwrap();
            submitted.push(challenge.clone());
            submitted.len() - 1
        };
        (self.submit)(challenge, seen)
    }

    async fn poll(&self, ticket: &str) -> Result<PollStatus, SolverError> {
        let seen = {
            let mut polls = self.polls.lock().unwrap();
            *polls += 1;
            *polls - 1
        };
        (self.poll)(ticket, seen)
    }
}

type InterpretHandler = Arc<
    dyn Fn(&InterpretationRequest, usize) -> Result<InterpretationResponse, InterpretationServiceError>
        + Send
        + Sync,
>;

/// Primary interpretation service with scripted answers.
pub struct ScriptedInterpreter {
    handler: InterpretHandler,
    delay: Option<Duration>,
    requests: Mutex<Vec<InterpretationRequest>>,
}

impl ScriptedInterpreter {
    pub fn new(
        handler: impl Fn(&InterpretationRequest, usize) -> Result<InterpretationResponse, InterpretationServiceError>
        + Send
        + Sync
        + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Arc::new(handler),
            delay: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Always answers `title` / `location` with `confidence`.
    pub fn answering(title: &str, location: &str, confidence: f64) -> Arc<Self> {
        let (title, location) = (title.to_string(), location.to_string());
        Self::new(move |_, _| {
            Ok(InterpretationResponse {
                title: Some(title.clone()),
                location: Some(location.clone()),
                confidence,
            })
        })
    }

    pub fn down() -> Arc<Self> {
        Self::new(|_, _| {
            Err(InterpretationServiceError::Unavailable(
                "connection refused".into(),
            ))
        })
    }

    /// Answers like `answering`, but only after `delay`.
    pub fn slow(title: &str, location: &str, delay: Duration) -> Arc<Self> {
        let (title, location) = (title.to_string(), location.to_string());
        Arc::new(Self {
            handler: Arc::new(move |_, _| {
                Ok(InterpretationResponse {
                    title: Some(title.clone()),
                    location: Some(location.clone()),
                    confidence: 0.9,
                })
            }),
            delay: Some(delay),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<InterpretationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InterpretationService for ScriptedInterpreter {
    async fn interpret(
        &self,
        request: &InterpretationRequest,
    ) -> Result<InterpretationResponse, InterpretationServiceError> {
        let seen = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(request, seen)
    }
}
