//! Bounded CAPTCHA handling around the scraping call.
//!
//! The scraped site can answer with a challenge instead of listings. The
//! [`CaptchaResolver`] turns that into an explicit state machine with a
//! visible attempt counter and deadline; the [`CaptchaSolver`] trait is the
//! seam to the external solving service.

mod resolver;
mod solver;

pub use resolver::{CaptchaError, CaptchaOutcome, CaptchaResolver};
pub use solver::{CaptchaSolver, PollStatus, SolverError, TwoCaptchaSolver};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// States of one scraping attempt's challenge handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptchaState {
    Idle,
    ChallengeDetected,
    SolutionRequested,
    SolutionPolling,
    Solved,
    Exhausted,
}

impl std::fmt::Display for CaptchaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CaptchaState::Idle => "idle",
            CaptchaState::ChallengeDetected => "challenge_detected",
            CaptchaState::SolutionRequested => "solution_requested",
            CaptchaState::SolutionPolling => "solution_polling",
            CaptchaState::Solved => "solved",
            CaptchaState::Exhausted => "exhausted",
        };
        write!(f, "{name}")
    }
}

/// A challenge raised by the scraping sub-service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptchaChallenge {
    pub token: String,
    /// Solver method, e.g. "turnstile".
    pub challenge_type: String,
    /// Opaque blob handed to the solving service.
    pub payload: Value,
    pub issued_at: DateTime<Utc>,
    /// Solve attempts made so far for the enclosing scrape.
    pub attempts: u32,
}

#[derive(Deserialize)]
struct ChallengeDetail {
    token: String,
    #[serde(default = "default_challenge_type")]
    challenge_type: String,
    #[serde(default)]
    payload: Value,
}

fn default_challenge_type() -> String {
    "turnstile".to_string()
}

impl CaptchaChallenge {
    /// Read the challenge marker carried in an error envelope's `data`.
    pub fn from_detail(detail: &Value) -> Result<Self, String> {
        let detail = ChallengeDetail::deserialize(detail)
            .map_err(|e| format!("unrecognizable challenge marker: {e}"))?;
        if detail.token.trim().is_empty() {
            return Err("challenge marker without token".to_string());
        }
        Ok(Self {
            token: detail.token,
            challenge_type: detail.challenge_type,
            payload: detail.payload,
            issued_at: Utc::now(),
            attempts: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_challenge_detail() {
        let challenge = CaptchaChallenge::from_detail(&json!({
            "token": "t-1",
            "payload": {"sitekey": "0x4"}
        }))
        .unwrap();
        assert_eq!(challenge.token, "t-1");
        assert_eq!(challenge.challenge_type, "turnstile");
        assert_eq!(challenge.payload["sitekey"], "0x4");
        assert_eq!(challenge.attempts, 0);
    }

    #[test]
    fn rejects_marker_without_token() {
        assert!(CaptchaChallenge::from_detail(&json!({"payload": {}})).is_err());
        assert!(CaptchaChallenge::from_detail(&json!({"token": " "})).is_err());
        assert!(CaptchaChallenge::from_detail(&Value::Null).is_err());
    }
}
