//! Uniform request/response access to the remote sub-services.

mod client;
pub mod envelope;
pub mod transport;

pub use client::SubServiceClient;
pub use envelope::{ErrorCode, RpcRequest, RpcResponse};
pub use transport::{HttpTransport, Transport, TransportError, TransportReply};

use serde_json::Value;
use thiserror::Error;

use crate::error::ErrorKind;

/// Normalized failure of a sub-service call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("{service}.{operation} timed out after {timeout_ms}ms")]
    Timeout {
        service: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("{service} unreachable: {message}")]
    Unreachable { service: String, message: String },

    #[error("{service}.{operation} rejected: {message}")]
    Rejected {
        service: String,
        operation: String,
        message: String,
    },

    #[error("{service} returned a malformed response: {message}")]
    Malformed { service: String, message: String },

    /// The target site asked for a challenge to be solved before serving.
    #[error("{service} requires a challenge to be solved")]
    Challenge { service: String, detail: Value },
}

impl RpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Timeout { .. } => ErrorKind::Timeout,
            RpcError::Unreachable { .. } => ErrorKind::Unreachable,
            RpcError::Rejected { .. } => ErrorKind::Rejected,
            RpcError::Malformed { .. } => ErrorKind::Malformed,
            RpcError::Challenge { .. } => ErrorKind::CaptchaUnsolved,
        }
    }

    /// `Timeout` and `Unreachable`: worth retrying, and reported to the registry.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    pub fn service(&self) -> &str {
        match self {
            RpcError::Timeout { service, .. }
            | RpcError::Unreachable { service, .. }
            | RpcError::Rejected { service, .. }
            | RpcError::Malformed { service, .. }
            | RpcError::Challenge { service, .. } => service,
        }
    }
}
