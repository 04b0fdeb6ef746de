use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use super::envelope::RpcRequest;
use crate::error::JobflowError;
use crate::registry::Endpoint;

/// Raw reply from a sub-service: HTTP-level status plus the unparsed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

impl TransportReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    TimedOut,

    #[error("request failed: {0}")]
    Request(String),
}

/// Capability shared by every sub-service adaptor: deliver one envelope to
/// one endpoint and hand back whatever came back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &RpcRequest,
    ) -> Result<TransportReply, TransportError>;
}

/// JSON-over-HTTP transport: `POST {address}/rpc`.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, JobflowError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &RpcRequest,
    ) -> Result<TransportReply, TransportError> {
        let url = format!("{}/rpc", endpoint.address);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(TransportReply { status, body })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::TimedOut
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint(address: String) -> Endpoint {
        Endpoint {
            name: "labor_stats".into(),
            address,
            capabilities: vec![],
        }
    }

    #[tokio::test]
    async fn posts_envelope_to_rpc_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(body_json(json!({"operation": "search_job", "payload": {"title": "Nurse"}})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "ok", "data": {"occupation": "Nurse"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let reply = transport
            .send(
                &endpoint(server.uri()),
                &RpcRequest {
                    operation: "search_job".into(),
                    payload: json!({"title": "Nurse"}),
                },
            )
            .await
            .unwrap();

        assert!(reply.is_success());
        assert!(reply.body.contains("Nurse"));
    }

    #[tokio::test]
    async fn non_success_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let reply = transport
            .send(
                &endpoint(server.uri()),
                &RpcRequest {
                    operation: "search_job".into(),
                    payload: json!({}),
                },
            )
            .await
            .unwrap();

        assert_eq!(reply.status, 503);
        assert_eq!(reply.body, "overloaded");
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect_error() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .send(
                &endpoint("http://127.0.0.1:9".into()),
                &RpcRequest {
                    operation: "search_job".into(),
                    payload: json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
