//! Free-text query → (title, location) with a confidence score.
//!
//! Two strategies in a fixed order: the primary interpretation service, then
//! the deterministic local heuristic. The result always says which one
//! produced it.

pub mod heuristic;
mod service;
pub mod validation;
pub mod vocabulary;

pub use service::{
    HttpInterpretationService, InterpretationRequest, InterpretationResponse,
    InterpretationService, InterpretationServiceError,
};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::{JobQuery, ParsedQuery, QuerySource};
use heuristic::HeuristicParse;
use validation::Rejection;

pub const IMPLAUSIBLE_FEEDBACK: &str = "previous attempt was implausible";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpretError {
    #[error("{message}")]
    InterpretationFailed {
        message: String,
        suggestions: Vec<String>,
    },

    #[error("interpretation cancelled")]
    Cancelled,
}

impl From<Rejection> for InterpretError {
    fn from(rejection: Rejection) -> Self {
        InterpretError::InterpretationFailed {
            message: rejection.message,
            suggestions: rejection.suggestions,
        }
    }
}

// A primary answer after cleaning and normalization.
#[derive(Debug, Clone)]
struct Candidate {
    title: Option<String>,
    location: Option<String>,
    confidence: f64,
    problems: Vec<String>,
}

impl Candidate {
    fn from_primary(raw: &str, response: InterpretationResponse) -> Self {
        let title = vocabulary::clean(response.title.as_deref()).map(|t| vocabulary::normalize_title(&t));
        let location =
            vocabulary::clean(response.location.as_deref()).map(|l| vocabulary::normalize_location(&l));
        Self::checked(raw, title, location, rescale(response.confidence))
    }

    fn from_heuristic(raw: &str, parse: HeuristicParse) -> Self {
        Self::checked(raw, parse.title, parse.location, parse.confidence)
    }

    fn checked(raw: &str, title: Option<String>, location: Option<String>, confidence: f64) -> Self {
        let mut problems = Vec::new();
        match &title {
            Some(title) => problems.extend(validation::title_problems(raw, title)),
            None => problems.push("no job title".to_string()),
        }
        match &location {
            Some(location) => problems.extend(validation::location_problems(raw, location)),
            None => problems.push("no location".to_string()),
        }
        Self {
            title,
            location,
            confidence,
            problems,
        }
    }

    fn is_plausible(&self) -> bool {
        self.problems.is_empty()
    }

    fn fields(&self) -> Option<(&str, &str)> {
        Some((self.title.as_deref()?, self.location.as_deref()?))
    }

    fn into_parsed(self, source: QuerySource, low_confidence: bool) -> Option<ParsedQuery> {
        Some(ParsedQuery {
            title: self.title?,
            location: self.location?,
            confidence: self.confidence,
            source,
            low_confidence,
        })
    }
}

// Services report 0–1 or 0–100.
fn rescale(confidence: f64) -> f64 {
    if !confidence.is_finite() || confidence < 0.0 {
        0.0
    } else if confidence > 1.0 {
        (confidence / 100.0).min(1.0)
    } else {
        confidence
    }
}

/// Primary-then-fallback query interpreter.
pub struct QueryInterpreter {
    primary: Option<Arc<dyn InterpretationService>>,
    timeout: Duration,
}

impl QueryInterpreter {
    pub fn new(primary: Option<Arc<dyn InterpretationService>>, timeout: Duration) -> Self {
        Self { primary, timeout }
    }

    /// Interpreter that only ever uses the local heuristic.
    pub fn heuristic_only() -> Self {
        Self::new(None, Duration::ZERO)
    }

    /// Interpret `query`.
    ///
    /// A primary answer that fails validation is retried once with
    /// [`IMPLAUSIBLE_FEEDBACK`]. If it is still implausible it is accepted
    /// with `low_confidence` only when the heuristic agrees with it (or has
    /// nothing to say); a plausible heuristic answer that differs makes the
    /// query `InterpretationFailed`.
    pub async fn interpret(
        &self,
        query: &JobQuery,
        cancel: &CancellationToken,
    ) -> Result<ParsedQuery, InterpretError> {
        validation::precheck(&query.raw)?;

        let fallback = Candidate::from_heuristic(&query.raw, heuristic::extract(query));

        let Some(primary) = &self.primary else {
            return accept_fallback(fallback);
        };

        let first = match self.ask(primary.as_ref(), query, None, cancel).await? {
            Some(candidate) => candidate,
            None => return accept_fallback(fallback),
        };
        if first.is_plausible() {
            return first
                .into_parsed(QuerySource::Primary, false)
                .ok_or_else(|| unusable(&[]));
        }

        debug!(problems = ?first.problems, "primary interpretation implausible, retrying with feedback");
        let feedback = format!("{IMPLAUSIBLE_FEEDBACK}: {}", first.problems.join("; "));
        let latest = match self.ask(primary.as_ref(), query, Some(feedback), cancel).await? {
            Some(retry) if retry.is_plausible() => {
                return retry
                    .into_parsed(QuerySource::Primary, false)
                    .ok_or_else(|| unusable(&[]));
            }
            Some(retry) if retry.fields().is_some() => retry,
            _ => first,
        };

        reconcile(latest, fallback)
    }

    // Ok(None): the service failed; the caller falls back.
    async fn ask(
        &self,
        primary: &dyn InterpretationService,
        query: &JobQuery,
        feedback: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<Option<Candidate>, InterpretError> {
        let request = InterpretationRequest {
            raw_query: query.raw.clone(),
            title_hint: query.title_hint.clone(),
            location_hint: query.location_hint.clone(),
            feedback,
        };

        let answer = tokio::select! {
            _ = cancel.cancelled() => return Err(InterpretError::Cancelled),
            answer = tokio::time::timeout(self.timeout, primary.interpret(&request)) => answer,
        };

        match answer {
            Ok(Ok(response)) => Ok(Some(Candidate::from_primary(&query.raw, response))),
            Ok(Err(e)) => {
                warn!(error = %e, "interpretation service failed, using local heuristic");
                Ok(None)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "interpretation service timed out, using local heuristic"
                );
                Ok(None)
            }
        }
    }
}

fn accept_fallback(fallback: Candidate) -> Result<ParsedQuery, InterpretError> {
    if let Some(rejection) =
        validation::missing_fields(fallback.title.as_deref(), fallback.location.as_deref())
    {
        return Err(rejection.into());
    }
    let mut fallback = fallback;
    if !fallback.is_plausible() {
        fallback.confidence /= 2.0;
    }
    info!(
        title = fallback.title.as_deref().unwrap_or_default(),
        location = fallback.location.as_deref().unwrap_or_default(),
        confidence = fallback.confidence,
        "query interpreted by local heuristic"
    );
    fallback
        .into_parsed(QuerySource::Fallback, true)
        .ok_or_else(|| unusable(&[]))
}

// Primary still implausible after the feedback retry.
fn reconcile(primary: Candidate, fallback: Candidate) -> Result<ParsedQuery, InterpretError> {
    let Some((title, location)) = primary.fields() else {
        return accept_fallback(fallback);
    };

    match fallback.fields() {
        Some(fields) if fields == (title, location) => {
            let confidence = primary.confidence.min(fallback.confidence);
            info!(title, location, "implausible primary answer confirmed by local heuristic");
            let mut primary = primary;
            primary.confidence = confidence;
            primary
                .into_parsed(QuerySource::Primary, true)
                .ok_or_else(|| unusable(&[]))
        }
        Some((other_title, other_location)) if fallback.is_plausible() => {
            Err(InterpretError::InterpretationFailed {
                message: format!(
                    "Interpretations disagree: '{title} in {location}' vs '{other_title} in {other_location}'"
                ),
                suggestions: vec![
                    format!("Try: '{other_title} in {other_location}'"),
                    format!("Try: '{title} in {location}'"),
                    "Provide the job title and location as separate fields".to_string(),
                ],
            })
        }
        _ => {
            let mut primary = primary;
            primary.confidence /= 2.0;
            primary
                .into_parsed(QuerySource::Primary, true)
                .ok_or_else(|| unusable(&[]))
        }
    }
}

fn unusable(problems: &[String]) -> InterpretError {
    InterpretError::InterpretationFailed {
        message: format!("Unable to interpret the query {}", problems.join("; ")).trim().to_string(),
        suggestions: vec!["Format: '[Job Title] in [Location]'".to_string()],
    }
}
