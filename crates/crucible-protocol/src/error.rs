//! JSON-RPC error taxonomy

use crate::message::{RequestId, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// No matching response arrived before the call deadline.
pub const INVALID_RESPONSE: i32 = -32060;

/// The `error` member of a failure response.
///
/// Also a Rust error type, so method implementations can return it through
/// `anyhow` and have it reach the wire unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a diagnostic payload.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid request")
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(INVALID_PARAMS, "Invalid params")
    }

    pub fn internal_error() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }

    pub fn invalid_response() -> Self {
        Self::new(INVALID_RESPONSE, "Invalid response")
    }

    pub fn into_response(self, id: Option<RequestId>) -> Response {
        Response::failure(id, self)
    }
}

/// Errors from the NUL framing codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcError::parse_error().code, -32700);
        assert_eq!(RpcError::invalid_request().code, -32600);
        assert_eq!(RpcError::method_not_found().code, -32601);
        assert_eq!(RpcError::invalid_params().code, -32602);
        assert_eq!(RpcError::internal_error().code, -32603);
        assert_eq!(RpcError::invalid_response().code, -32060);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(RpcError::parse_error().message, "Parse error");
        assert_eq!(RpcError::invalid_request().message, "Invalid request");
        assert_eq!(RpcError::method_not_found().message, "Method not found");
        assert_eq!(RpcError::invalid_params().message, "Invalid params");
        assert_eq!(RpcError::internal_error().message, "Internal error");
        assert_eq!(RpcError::invalid_response().message, "Invalid response");
    }

    #[test]
    fn test_data_omitted_when_absent() {
        let json = serde_json::to_value(RpcError::method_not_found()).unwrap();
        assert_eq!(json, json!({"code": -32601, "message": "Method not found"}));
    }

    #[test]
    fn test_data_serialized_when_present() {
        let json = serde_json::to_value(RpcError::invalid_request().with_data("Uncompliant object"))
            .unwrap();
        assert_eq!(json["data"], "Uncompliant object");
    }

    #[test]
    fn test_display_includes_code() {
        assert_eq!(RpcError::internal_error().to_string(), "Internal error (-32603)");
    }

    #[test]
    fn test_parse_failure_has_null_id() {
        let resp = Response::parse_failure("Malformed JSON");
        assert_eq!(resp.id(), None);
        let err = resp.error().unwrap();
        assert_eq!(err.code, PARSE_ERROR);
        assert_eq!(err.data, Some(json!("Malformed JSON")));
    }

    #[test]
    fn test_into_response_keeps_id() {
        let resp = RpcError::invalid_response().into_response(Some(RequestId::from("abc")));
        assert_eq!(resp.id(), Some(&RequestId::from("abc")));
        assert!(!resp.is_success());
    }
}
