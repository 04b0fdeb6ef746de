use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::envelope::{ErrorCode, RpcRequest, RpcResponse};
use super::transport::{Transport, TransportError, TransportReply};
use super::RpcError;
use crate::config::ServicesConfig;
use crate::registry::ServerRegistry;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Uniform client for every registered sub-service.
///
/// Resolves the endpoint through the [`ServerRegistry`], applies the call
/// timeout, validates the response envelope, and reports `Timeout` /
/// `Unreachable` back to the registry. It never retries.
pub struct SubServiceClient {
    registry: Arc<ServerRegistry>,
    transport: Arc<dyn Transport>,
    timeouts: HashMap<String, Duration>,
    default_timeout: Duration,
}

impl SubServiceClient {
    pub fn new(registry: Arc<ServerRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
            timeouts: HashMap::new(),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Client with each configured sub-service's default timeout.
    pub fn from_config(
        registry: Arc<ServerRegistry>,
        transport: Arc<dyn Transport>,
        services: &ServicesConfig,
    ) -> Self {
        services
            .iter()
            .fold(Self::new(registry, transport), |client, (name, service)| {
                client.with_timeout(name, service.timeout())
            })
    }

    pub fn with_timeout(mut self, service: &str, timeout: Duration) -> Self {
        self.timeouts.insert(service.to_string(), timeout);
        self
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn timeout_for(&self, service: &str) -> Duration {
        self.timeouts
            .get(service)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Call `operation` on `service`. `timeout` overrides the service default.
    pub async fn call(
        &self,
        service: &str,
        operation: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let endpoint = self.registry.resolve(service).map_err(|e| RpcError::Unreachable {
            service: service.to_string(),
            message: e.to_string(),
        })?;

        if !endpoint.supports(operation) {
            return Err(RpcError::Rejected {
                service: service.to_string(),
                operation: operation.to_string(),
                message: "operation not advertised by service".to_string(),
            });
        }

        let timeout = timeout.unwrap_or_else(|| self.timeout_for(service));
        let request = RpcRequest {
            operation: operation.to_string(),
            payload,
        };

        debug!(
            service,
            operation,
            address = %endpoint.address,
            timeout_ms = timeout.as_millis() as u64,
            "calling sub-service"
        );

        let result = match tokio::time::timeout(timeout, self.transport.send(&endpoint, &request)).await
        {
            Err(_) | Ok(Err(TransportError::TimedOut)) => Err(RpcError::Timeout {
                service: service.to_string(),
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(RpcError::Unreachable {
                service: service.to_string(),
                message: e.to_string(),
            }),
            Ok(Ok(reply)) => interpret_reply(service, operation, timeout, reply),
        };

        if let Err(e) = &result {
            if e.is_transient() {
                self.registry.mark_unhealthy(service);
            }
            if !matches!(e, RpcError::Challenge { .. }) {
                warn!(service, operation, error = %e, "sub-service call failed");
            }
        }

        result
    }

    /// Like [`call`](Self::call), decoding `data` into `T`. A payload that
    /// does not fit `T` is `Malformed`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<T, RpcError> {
        let data = self.call(service, operation, payload, timeout).await?;
        serde_json::from_value(data).map_err(|e| RpcError::Malformed {
            service: service.to_string(),
            message: format!("{operation} response does not match schema: {e}"),
        })
    }
}

fn interpret_reply(
    service: &str,
    operation: &str,
    timeout: Duration,
    reply: TransportReply,
) -> Result<Value, RpcError> {
    let envelope = match RpcResponse::parse(&reply.body) {
        Ok(envelope) => envelope,
        Err(defect) if reply.is_success() => {
            return Err(RpcError::Malformed {
                service: service.to_string(),
                message: defect,
            });
        }
        // A bare HTTP error with no envelope.
        Err(_) => return Err(status_error(service, operation, timeout, &reply)),
    };

    match envelope {
        RpcResponse::Ok(data) => Ok(data),
        RpcResponse::Error {
            code,
            message,
            data,
        } => {
            let message = message.unwrap_or_else(|| format!("{code:?}").to_lowercase());
            Err(match code {
                ErrorCode::Timeout => RpcError::Timeout {
                    service: service.to_string(),
                    operation: operation.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                },
                ErrorCode::Unreachable => RpcError::Unreachable {
                    service: service.to_string(),
                    message,
                },
                ErrorCode::Rejected => RpcError::Rejected {
                    service: service.to_string(),
                    operation: operation.to_string(),
                    message,
                },
                ErrorCode::Malformed => RpcError::Malformed {
                    service: service.to_string(),
                    message,
                },
                ErrorCode::Challenge => RpcError::Challenge {
                    service: service.to_string(),
                    detail: data.unwrap_or(Value::Null),
                },
            })
        }
    }
}

// 408 is a timeout; 429 and 5xx mean "cannot serve right now"; other 4xx are rejections.
fn status_error(service: &str, operation: &str, timeout: Duration, reply: &TransportReply) -> RpcError {
    match reply.status {
        408 | 504 => RpcError::Timeout {
            service: service.to_string(),
            operation: operation.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        },
        429 | 500..=599 => RpcError::Unreachable {
            service: service.to_string(),
            message: format!("HTTP {}: {}", reply.status, reply.body),
        },
        _ => RpcError::Rejected {
            service: service.to_string(),
            operation: operation.to_string(),
            message: format!("HTTP {}: {}", reply.status, reply.body),
        },
    }
}
