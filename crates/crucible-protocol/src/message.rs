//! JSON-RPC 2.0 message model
//!
//! Field values that the protocol treats as "present but wrong" (a `jsonrpc`
//! tag other than `"2.0"`, an `id` of `null`) are kept as data instead of
//! failing the decode, so the dispatcher can answer with the matching error.

use crate::error::RpcError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID (can be string or integer)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    /// Integers above `i64::MAX`.
    Unsigned(u64),
    String(String),
}

impl RequestId {
    /// Opaque random identifier (UUID v4)
    pub fn random() -> Self {
        Self::String(uuid::Uuid::new_v4().to_string())
    }

    /// Read an identifier out of a raw JSON value.
    ///
    /// Only strings and integers qualify; `null`, fractions, booleans and
    /// structured values do not.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Number)
                .or_else(|| n.as_u64().map(Self::Unsigned)),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Unsigned(n) => write!(f, "{}", n),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// The `jsonrpc` version tag.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Version {
    #[default]
    V2,
    Unsupported(Value),
}

impl Version {
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::V2)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::V2 => serializer.serialize_str(JSONRPC_VERSION),
            Self::Unsupported(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.as_str() == Some(JSONRPC_VERSION) {
            Ok(Self::V2)
        } else {
            Ok(Self::Unsupported(value))
        }
    }
}

/// The `id` member of a request.
///
/// `Absent` marks a notification. `Invalid` holds an `id` that was sent but
/// is neither a string nor an integer (most commonly `null`).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Id {
    #[default]
    Absent,
    Valid(RequestId),
    Invalid(Value),
}

impl Id {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_valid(&self) -> Option<&RequestId> {
        match self {
            Self::Valid(id) => Some(id),
            _ => None,
        }
    }
}

impl From<RequestId> for Id {
    fn from(id: RequestId) -> Self {
        Self::Valid(id)
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Absent => serializer.serialize_none(),
            Self::Valid(id) => id.serialize(serializer),
            Self::Invalid(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match RequestId::from_value(&value) {
            Some(id) => Self::Valid(id),
            None => Self::Invalid(value),
        })
    }
}

/// The `method` member of a request.
///
/// A `method` that is not a string names no method, so it is kept as
/// `Invalid` and fails the lookup instead of the decode.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodName {
    Name(String),
    Invalid(Value),
}

impl MethodName {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Name(name) => Some(name),
            Self::Invalid(_) => None,
        }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Invalid(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for MethodName {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for MethodName {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl Serialize for MethodName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Name(name) => serializer.serialize_str(name),
            Self::Invalid(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MethodName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(name) => Self::Name(name),
            other => Self::Invalid(other),
        })
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)` instead of folding it into `None`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// A call (with `id`) or a notification (without).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub jsonrpc: Version,
    #[serde(default, skip_serializing_if = "Id::is_absent")]
    pub id: Id,
    pub method: MethodName,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub params: Option<Value>,
}

impl Request {
    /// A call expecting exactly one response.
    pub fn call(id: impl Into<RequestId>, method: impl Into<MethodName>) -> Self {
        Self {
            jsonrpc: Version::V2,
            id: Id::Valid(id.into()),
            method: method.into(),
            params: None,
        }
    }

    /// A fire-and-forget notification.
    pub fn notification(method: impl Into<MethodName>) -> Self {
        Self {
            jsonrpc: Version::V2,
            id: Id::Absent,
            method: method.into(),
            params: None,
        }
    }

    /// Attach positional parameters.
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = Some(Value::Array(params));
        self
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_absent()
    }

    pub fn correlation_id(&self) -> Option<&RequestId> {
        self.id.as_valid()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuccessResponse {
    pub jsonrpc: Version,
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FailureResponse {
    pub jsonrpc: Version,
    /// `None` serializes as `null`: the request id could not be determined.
    pub id: Option<RequestId>,
    pub error: RpcError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessResponse),
    Failure(FailureResponse),
}

impl Response {
    pub fn success(id: RequestId, result: impl Into<Value>) -> Self {
        Self::Success(SuccessResponse {
            jsonrpc: Version::V2,
            id,
            result: result.into(),
        })
    }

    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self::Failure(FailureResponse {
            jsonrpc: Version::V2,
            id,
            error,
        })
    }

    /// Parse error (-32700) with a `null` id.
    pub fn parse_failure(cause: impl Into<Value>) -> Self {
        Self::failure(None, RpcError::parse_error().with_data(cause))
    }

    /// Invalid request (-32600) with a `null` id.
    pub fn invalid_request(cause: impl Into<Value>) -> Self {
        Self::failure(None, RpcError::invalid_request().with_data(cause))
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Success(success) => Some(&success.id),
            Self::Failure(failure) => failure.id.as_ref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success(success) => Some(&success.result),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RpcError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(&failure.error),
        }
    }
}

/// Anything that can travel on the wire as a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Request(Request),
    Response(Response),
}

/// What a peer produces for one inbound payload or one outbound send:
/// a single response, or the non-empty responses of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Single(Response),
    Batch(Vec<Response>),
}

impl Reply {
    /// `None` when every element of the batch went unanswered.
    pub fn from_batch(responses: Vec<Response>) -> Option<Self> {
        if responses.is_empty() {
            None
        } else {
            Some(Self::Batch(responses))
        }
    }

    pub fn into_single(self) -> Option<Response> {
        match self {
            Self::Single(response) => Some(response),
            Self::Batch(_) => None,
        }
    }

    pub fn into_batch(self) -> Option<Vec<Response>> {
        match self {
            Self::Single(_) => None,
            Self::Batch(responses) => Some(responses),
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Self::Single(response)
    }
}
