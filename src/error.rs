use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobflowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classification of an entry in a run's error history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InterpretationFailed,
    LowConfidenceQuery,
    Unreachable,
    Timeout,
    Rejected,
    Malformed,
    CaptchaUnsolved,
    SolveSubmissionFailed,
    EnrichmentDegraded,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Transient kinds are retried with backoff by the stage that owns the call.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Unreachable | ErrorKind::Timeout)
    }
}

/// Why the scraping stage gave up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ScrapeFailure {
    /// The resolver's bounded loop ran out of attempts or wall-clock budget.
    CaptchaUnsolved { attempts: u32 },
    /// The solving service refused the challenge (down, bad key).
    SolveSubmissionFailed { message: String },
    /// Every retry hit `Timeout` / `Unreachable`.
    RetriesExhausted {
        attempts: u32,
        last_kind: ErrorKind,
        last_error: String,
    },
    Rejected { message: String },
    Malformed { message: String },
}

impl ScrapeFailure {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeFailure::CaptchaUnsolved { .. } => ErrorKind::CaptchaUnsolved,
            ScrapeFailure::SolveSubmissionFailed { .. } => ErrorKind::SolveSubmissionFailed,
            ScrapeFailure::RetriesExhausted { last_kind, .. } => *last_kind,
            ScrapeFailure::Rejected { .. } => ErrorKind::Rejected,
            ScrapeFailure::Malformed { .. } => ErrorKind::Malformed,
        }
    }
}

impl std::fmt::Display for ScrapeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeFailure::CaptchaUnsolved { attempts } => {
                write!(f, "CaptchaUnsolved after {attempts} attempt(s)")
            }
            ScrapeFailure::SolveSubmissionFailed { message } => {
                write!(f, "SolveSubmissionFailed: {message}")
            }
            ScrapeFailure::RetriesExhausted {
                attempts,
                last_error,
                ..
            } => write!(f, "retries exhausted after {attempts} attempt(s): {last_error}"),
            ScrapeFailure::Rejected { message } => write!(f, "rejected: {message}"),
            ScrapeFailure::Malformed { message } => write!(f, "malformed response: {message}"),
        }
    }
}

/// Broad bucket a terminal failure falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The query itself needs refinement.
    BadInput,
    /// A sub-service was down, slow, or misbehaving.
    Infrastructure,
    /// The scraped site's challenge could not be solved.
    Challenge,
    Cancelled,
    Internal,
}

/// The typed reason carried by every `Failed` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    InterpretationFailed {
        message: String,
        suggestions: Vec<String>,
    },
    LowConfidenceQuery {
        confidence: f64,
        threshold: f64,
    },
    ScrapeFailed {
        cause: ScrapeFailure,
    },
    Cancelled {
        message: String,
    },
    Internal {
        message: String,
    },
}

impl FailureReason {
    /// Error-history classification of this terminal failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FailureReason::InterpretationFailed { .. } => ErrorKind::InterpretationFailed,
            FailureReason::LowConfidenceQuery { .. } => ErrorKind::LowConfidenceQuery,
            FailureReason::ScrapeFailed { cause } => cause.kind(),
            FailureReason::Cancelled { .. } => ErrorKind::Cancelled,
            FailureReason::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            FailureReason::InterpretationFailed { .. } | FailureReason::LowConfidenceQuery { .. } => {
                FailureCategory::BadInput
            }
            FailureReason::ScrapeFailed {
                cause: ScrapeFailure::CaptchaUnsolved { .. },
            } => FailureCategory::Challenge,
            FailureReason::ScrapeFailed { .. } => FailureCategory::Infrastructure,
            FailureReason::Cancelled { .. } => FailureCategory::Cancelled,
            FailureReason::Internal { .. } => FailureCategory::Internal,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InterpretationFailed { message, .. } => {
                write!(f, "InterpretationFailed: {message}")
            }
            FailureReason::LowConfidenceQuery {
                confidence,
                threshold,
            } => write!(
                f,
                "LowConfidenceQuery: confidence {confidence:.2} below threshold {threshold:.2}"
            ),
            FailureReason::ScrapeFailed { cause } => write!(f, "ScrapeFailed: {cause}"),
            FailureReason::Cancelled { message } => write!(f, "Cancelled: {message}"),
            FailureReason::Internal { message } => write!(f, "Internal: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captcha_failures_are_their_own_category() {
        let reason = FailureReason::ScrapeFailed {
            cause: ScrapeFailure::CaptchaUnsolved { attempts: 3 },
        };
        assert_eq!(reason.category(), FailureCategory::Challenge);

        let reason = FailureReason::ScrapeFailed {
            cause: ScrapeFailure::RetriesExhausted {
                attempts: 4,
                last_kind: ErrorKind::Timeout,
                last_error: "timeout".into(),
            },
        };
        assert_eq!(reason.category(), FailureCategory::Infrastructure);
        assert_eq!(reason.kind(), ErrorKind::Timeout);

        let reason = FailureReason::LowConfidenceQuery {
            confidence: 0.2,
            threshold: 0.5,
        };
        assert_eq!(reason.category(), FailureCategory::BadInput);
    }

    #[test]
    fn failure_reason_display() {
        let reason = FailureReason::LowConfidenceQuery {
            confidence: 0.25,
            threshold: 0.5,
        };
        assert_eq!(
            reason.to_string(),
            "LowConfidenceQuery: confidence 0.25 below threshold 0.50"
        );

        let reason = FailureReason::ScrapeFailed {
            cause: ScrapeFailure::CaptchaUnsolved { attempts: 1 },
        };
        assert_eq!(
            reason.to_string(),
            "ScrapeFailed: CaptchaUnsolved after 1 attempt(s)"
        );
    }

    #[test]
    fn failure_reason_serializes_with_tags() {
        let reason = FailureReason::ScrapeFailed {
            cause: ScrapeFailure::CaptchaUnsolved { attempts: 2 },
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "scrape_failed");
        assert_eq!(json["cause"]["cause"], "captcha_unsolved");
        assert_eq!(json["cause"]["attempts"], 2);
    }

    #[test]
    fn only_timeouts_and_unreachable_are_transient() {
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::Unreachable.is_transient());
        assert!(!ErrorKind::Rejected.is_transient());
        assert!(!ErrorKind::CaptchaUnsolved.is_transient());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JobflowError>();
    }
}
