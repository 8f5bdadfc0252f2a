//! Inbound request handling
//!
//! Validation happens in a fixed order: version, then identifier, then
//! method lookup, then parameter shape. Calls always get a response;
//! notifications never do, not even when they fail.

use crate::error::mask_method_error;
use crate::methods::MethodTable;
use crucible_protocol::{Id, MethodName, Request, RequestId, Response, RpcError};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct Dispatcher {
    methods: MethodTable,
}

impl Dispatcher {
    pub fn new(methods: MethodTable) -> Self {
        Self { methods }
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Handle one decoded request.
    ///
    /// Returns the response to send back, or `None` for a notification. A
    /// notification's method runs in the background and this returns
    /// immediately.
    pub async fn dispatch(&self, request: Request) -> Option<Response> {
        if !request.jsonrpc.is_supported() {
            return Some(Response::invalid_request("Unsupported version"));
        }

        match request.id {
            Id::Valid(id) => Some(self.reply(id, &request.method, request.params).await),
            Id::Invalid(_) => Some(Response::invalid_request("Invalid identifier")),
            Id::Absent => {
                self.notify(request.method, request.params);
                None
            }
        }
    }

    async fn reply(&self, id: RequestId, method: &MethodName, params: Option<Value>) -> Response {
        match self.invoke(method, params).await {
            Ok(result) => Response::success(id, result),
            Err(error) => error.into_response(Some(id)),
        }
    }

    fn notify(&self, method: MethodName, params: Option<Value>) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(error) = dispatcher.invoke(&method, params).await {
                debug!(method = %method, code = error.code, "Notification failed");
            }
        });
    }

    async fn invoke(&self, name: &MethodName, params: Option<Value>) -> Result<Value, RpcError> {
        let Some((name, method)) = name
            .as_str()
            .and_then(|name| Some((name, self.methods.get(name)?)))
        else {
            return Err(RpcError::method_not_found());
        };
        let params = positional(params)?;

        match AssertUnwindSafe(method.call(params)).catch_unwind().await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(mask_method_error(name, error)),
            Err(_) => {
                error!(method = name, "Method panicked");
                Err(RpcError::internal_error())
            }
        }
    }
}

/// Absent params mean "no arguments"; anything but an array is rejected.
fn positional(params: Option<Value>) -> Result<Vec<Value>, RpcError> {
    match params {
        None => Ok(Vec::new()),
        Some(Value::Array(params)) => Ok(params),
        Some(_) => Err(RpcError::invalid_params()),
    }
}
