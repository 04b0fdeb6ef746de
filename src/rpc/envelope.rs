//! Tipos do envelope RPC trocado com os sub-serviços.
//!
//! Requisição: `{operation, payload}`. Resposta:
//! `{status: ok|error, data | error_code}`. A validação estrutural
//! acontece aqui, para que os estágios seguintes nunca precisem revalidar.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Corpo de uma chamada a um sub-serviço.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Nome da operação (ex.: "scrape_jobs").
    pub operation: String,
    /// Argumentos da operação, repassados sem interpretação.
    pub payload: Value,
}

/// Códigos de erro aceitos no envelope de resposta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Timeout,
    Unreachable,
    Rejected,
    Malformed,
    Challenge,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Ok,
    Error,
}

// Forma crua do envelope, antes da validação.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    status: Status,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default, alias = "errorCode")]
    error_code: Option<ErrorCode>,
    #[serde(default)]
    message: Option<String>,
}

/// Envelope de resposta já validado.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Ok(Value),
    Error {
        code: ErrorCode,
        message: Option<String>,
        data: Option<Value>,
    },
}

impl RpcResponse {
    /// Valida o corpo recebido. Retorna a descrição do defeito quando o
    /// envelope é estruturalmente inválido.
    pub fn parse(body: &str) -> Result<Self, String> {
        let raw: RawEnvelope =
            serde_json::from_str(body).map_err(|e| format!("invalid envelope: {e}"))?;

        match raw.status {
            Status::Ok => match raw.data {
                Some(Value::Null) | None => Err("ok response without data".to_string()),
                Some(data) => Ok(RpcResponse::Ok(data)),
            },
            Status::Error => match raw.error_code {
                Some(code) => Ok(RpcResponse::Error {
                    code,
                    message: raw.message,
                    data: raw.data,
                }),
                None => Err("error response without error_code".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_ok_envelope() {
        let resp = RpcResponse::parse(r#"{"status":"ok","data":{"jobs":[]}}"#).unwrap();
        assert_eq!(resp, RpcResponse::Ok(json!({"jobs": []})));
    }

    #[test]
    fn parses_error_envelope_with_camel_case_code() {
        let resp =
            RpcResponse::parse(r#"{"status":"error","errorCode":"rejected","message":"bad key"}"#)
                .unwrap();
        assert_eq!(
            resp,
            RpcResponse::Error {
                code: ErrorCode::Rejected,
                message: Some("bad key".into()),
                data: None,
            }
        );
    }

    #[test]
    fn challenge_keeps_its_data() {
        let body = json!({
            "status": "error",
            "error_code": "challenge",
            "data": {"token": "t-1", "challenge_type": "turnstile", "payload": {}}
        })
        .to_string();
        match RpcResponse::parse(&body).unwrap() {
            RpcResponse::Error { code, data, .. } => {
                assert_eq!(code, ErrorCode::Challenge);
                assert_eq!(data.unwrap()["token"], "t-1");
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
    }

    #[test]
    fn rejects_structurally_invalid_envelopes() {
        assert!(RpcResponse::parse("not json").is_err());
        assert!(RpcResponse::parse(r#"{"status":"ok"}"#).is_err());
        assert!(RpcResponse::parse(r#"{"status":"ok","data":null}"#).is_err());
        assert!(RpcResponse::parse(r#"{"status":"error"}"#).is_err());
        assert!(RpcResponse::parse(r#"{"status":"error","error_code":"teapot"}"#).is_err());
        assert!(RpcResponse::parse(r#"{"status":"maybe","data":{}}"#).is_err());
    }

    #[test]
    fn request_serializes_as_envelope() {
        let req = RpcRequest {
            operation: "search_job".into(),
            payload: json!({"title": "Nurse"}),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, json!({"operation": "search_job", "payload": {"title": "Nurse"}}));
    }
}
