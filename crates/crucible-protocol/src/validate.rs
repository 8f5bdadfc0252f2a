//! Structural classification of decoded JSON values.
//!
//! These predicates look only at the field *names* of an object, never at the
//! value types, so a message keeps its classification even when a value is
//! wrong (the dispatcher reports that separately).

use crate::message::RequestId;
use serde_json::{Map, Value};

/// True for any JSON object. Arrays and scalars are never messages.
pub fn is_message(value: &Value) -> bool {
    as_message(value).is_some()
}

/// The member map of a message, if `value` is one.
pub fn as_message(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

/// `jsonrpc` and `method` are required; `id` and `params` are optional;
/// nothing else may appear.
pub fn is_request(message: &Map<String, Value>) -> bool {
    let mut required = 0;

    for key in message.keys() {
        match key.as_str() {
            "jsonrpc" | "method" => required += 1,
            "id" | "params" => {}
            _ => return false,
        }
    }

    required == 2
}

/// `jsonrpc` and `id` are required, plus exactly one of `result` / `error`;
/// nothing else may appear.
pub fn is_response(message: &Map<String, Value>) -> bool {
    let mut required = 0;
    let mut outcome = 0;

    for key in message.keys() {
        match key.as_str() {
            "jsonrpc" | "id" => required += 1,
            "result" | "error" => outcome += 1,
            _ => return false,
        }
    }

    required == 2 && outcome == 1
}

/// True when the `id` member is a string or an integer.
pub fn has_id(message: &Map<String, Value>) -> bool {
    message
        .get("id")
        .is_some_and(|id| RequestId::from_value(id).is_some())
}
