//! Transport and method error plumbing

use crucible_protocol::RpcError;

/// Failures of the socket connection managers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not connected")]
    NotConnected,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Convert a method failure into the error that goes on the wire.
///
/// An [`RpcError`] anywhere in the chain is passed through untouched. Any
/// other failure is logged and replaced by a bare Internal error, so method
/// internals never leak to the remote side.
pub fn mask_method_error(method: &str, error: anyhow::Error) -> RpcError {
    match error.downcast::<RpcError>() {
        Ok(rpc) => rpc,
        Err(other) => {
            tracing::error!(method, "Internal error: {:#}", other);
            RpcError::internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use crucible_protocol::{INTERNAL_ERROR, INVALID_PARAMS};
    use serde_json::json;

    #[test]
    fn test_rpc_error_passes_through() {
        let err = anyhow::Error::from(RpcError::invalid_params().with_data("x"));
        let masked = mask_method_error("addition", err);
        assert_eq!(masked.code, INVALID_PARAMS);
        assert_eq!(masked.data, Some(json!("x")));
    }

    #[test]
    fn test_rpc_error_survives_context() {
        let result: Result<(), RpcError> = Err(RpcError::new(-1, "custom"));
        let err = result.context("while adding").unwrap_err();
        assert_eq!(mask_method_error("addition", err), RpcError::new(-1, "custom"));
    }

    #[test]
    fn test_other_errors_are_masked() {
        let masked = mask_method_error("throws", anyhow::anyhow!("secret path /etc/shadow"));
        assert_eq!(masked.code, INTERNAL_ERROR);
        assert_eq!(masked.message, "Internal error");
        assert!(masked.data.is_none());
    }
}
