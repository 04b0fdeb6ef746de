//! Cliente do serviço primário de interpretação de consultas.
//!
//! Contrato: `POST {endpoint}` com `{rawQuery, titleHint?, locationHint?,
//! feedback?}`, resposta `{title, location, confidence}`. Qualquer falha
//! é devolvida como [`InterpretationServiceError`] para que o
//! [`QueryInterpreter`](super::QueryInterpreter) recorra à heurística local.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::InterpreterConfig;
use crate::error::JobflowError;

/// Corpo enviado ao serviço de interpretação.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterpretationRequest {
    /// Texto livre digitado pelo usuário.
    pub raw_query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
    /// Dica explícita quando a tentativa anterior foi considerada implausível.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Resposta do serviço. Campos ausentes ou `null` são aceitos aqui e
/// tratados na validação.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterpretationResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Escala 0–1 ou 0–100; normalizada pelo interpretador.
    #[serde(default)]
    pub confidence: f64,
}

/// Erros do serviço primário de interpretação.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpretationServiceError {
    /// HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Qualquer outro status HTTP de erro.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Falha de rede ou timeout.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Corpo da resposta fora do contrato.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Estratégia primária de interpretação. Implementada pelo cliente HTTP e,
/// nos testes, por implementações roteirizadas.
#[async_trait]
pub trait InterpretationService: Send + Sync {
    async fn interpret(
        &self,
        request: &InterpretationRequest,
    ) -> Result<InterpretationResponse, InterpretationServiceError>;
}

/// Cliente HTTP do serviço de interpretação.
pub struct HttpInterpretationService {
    api_key: String,
    client: Client,
    endpoint: String,
}

impl HttpInterpretationService {
    pub fn new(endpoint: String, api_key: String, timeout: Duration) -> Result<Self, JobflowError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            endpoint,
        })
    }

    /// `None` quando nenhum endpoint está configurado.
    pub fn from_config(config: &InterpreterConfig) -> Result<Option<Self>, JobflowError> {
        config
            .endpoint
            .as_ref()
            .map(|endpoint| Self::new(endpoint.clone(), config.api_key.clone(), config.timeout()))
            .transpose()
    }
}

#[async_trait]
impl InterpretationService for HttpInterpretationService {
    async fn interpret(
        &self,
        request: &InterpretationRequest,
    ) -> Result<InterpretationResponse, InterpretationServiceError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| InterpretationServiceError::Unavailable(e.to_string()))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(InterpretationServiceError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(InterpretationServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<InterpretationResponse>()
            .await
            .map_err(|e| InterpretationServiceError::Malformed(e.to_string()))
    }
}
