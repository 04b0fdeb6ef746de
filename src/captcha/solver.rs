use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::CaptchaChallenge;
use crate::config::CaptchaConfig;
use crate::error::JobflowError;

// 2captcha's answer while the worker is still busy.
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// Answer to one poll of the solving service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Solved(String),
    /// The service gave up on this challenge.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    /// The service refused the request (bad key, zero balance, bad params).
    #[error("solving service rejected the request: {0}")]
    Rejected(String),

    /// The service could not be reached or answered with an HTTP error.
    #[error("solving service unavailable: {0}")]
    Unavailable(String),

    #[error("solving service returned an unexpected response: {0}")]
    Malformed(String),
}

impl SolverError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SolverError::Unavailable(_))
    }
}

/// External CAPTCHA solving service.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Submit a challenge; returns the service's ticket for polling.
    async fn submit(&self, challenge: &CaptchaChallenge) -> Result<String, SolverError>;

    async fn poll(&self, ticket: &str) -> Result<PollStatus, SolverError>;
}

/// 2captcha-compatible solver (`in.php` / `res.php`, JSON mode).
pub struct TwoCaptchaSolver {
    client: Client,
    api_key: String,
    submit_url: String,
    result_url: String,
}

#[derive(Debug, Deserialize)]
struct TwoCaptchaReply {
    status: i64,
    request: String,
}

impl TwoCaptchaSolver {
    pub fn new(config: &CaptchaConfig) -> Result<Self, JobflowError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            submit_url: config.submit_url.clone(),
            result_url: config.result_url.clone(),
        })
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<TwoCaptchaReply, SolverError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| SolverError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SolverError::Unavailable(format!("HTTP {status}")));
        }

        response
            .json::<TwoCaptchaReply>()
            .await
            .map_err(|e| SolverError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaSolver {
    async fn submit(&self, challenge: &CaptchaChallenge) -> Result<String, SolverError> {
        if self.api_key.is_empty() {
            return Err(SolverError::Rejected(
                "solving service api key not configured".to_string(),
            ));
        }

        let sitekey = challenge
            .payload
            .get("sitekey")
            .and_then(|v| v.as_str())
            .unwrap_or(&challenge.token);
        let page_url = challenge
            .payload
            .get("page_url")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let reply = self
            .get(
                &self.submit_url,
                &[
                    ("key", self.api_key.as_str()),
                    ("method", challenge.challenge_type.as_str()),
                    ("sitekey", sitekey),
                    ("pageurl", page_url),
                    ("json", "1"),
                ],
            )
            .await?;

        if reply.status == 1 {
            debug!(ticket = %reply.request, "challenge submitted to solving service");
            Ok(reply.request)
        } else {
            Err(SolverError::Rejected(reply.request))
        }
    }

    async fn poll(&self, ticket: &str) -> Result<PollStatus, SolverError> {
        let reply = self
            .get(
                &self.result_url,
                &[
                    ("key", self.api_key.as_str()),
                    ("action", "get"),
                    ("id", ticket),
                    ("json", "1"),
                ],
            )
            .await?;

        Ok(match (reply.status, reply.request.as_str()) {
            (1, _) => PollStatus::Solved(reply.request),
            (_, NOT_READY) => PollStatus::Pending,
            _ => PollStatus::Failed(reply.request),
        })
    }
}
