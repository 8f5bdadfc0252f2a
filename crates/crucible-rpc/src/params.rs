//! Positional parameter extraction for method implementations
//!
//! Failures come back as Invalid params (-32602) so a method can use `?`
//! and have the error reach the caller unmasked.

use crucible_protocol::RpcError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize the parameter at `index`, failing if it is missing.
///
/// # Example
///
/// ```ignore
/// let a: i64 = required_param(&params, 0)?;
/// ```
pub fn required_param<T: DeserializeOwned>(params: &[Value], index: usize) -> Result<T, RpcError> {
    let value = params.get(index).ok_or_else(|| {
        RpcError::invalid_params().with_data(format!("Missing parameter at position {}", index))
    })?;
    decode(value, index)
}

/// Deserialize the parameter at `index`; missing or `null` gives `None`.
pub fn optional_param<T: DeserializeOwned>(
    params: &[Value],
    index: usize,
) -> Result<Option<T>, RpcError> {
    match params.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode(value, index).map(Some),
    }
}

fn decode<T: DeserializeOwned>(value: &Value, index: usize) -> Result<T, RpcError> {
    T::deserialize(value).map_err(|e| {
        RpcError::invalid_params().with_data(format!("Invalid parameter at position {}: {}", index, e))
    })
}
