//! Wire-level types for Crucible JSON-RPC peers
//!
//! - [`message`]: requests, responses, batches
//! - [`validate`]: field-set classification of raw JSON values
//! - [`error`]: the JSON-RPC error taxonomy
//! - [`codec`]: NUL-delimited framing over a byte stream

pub mod codec;
pub mod error;
pub mod message;
pub mod validate;

pub use codec::{encode_frame, NulCodec, DELIMITER};
pub use error::{
    CodecError, RpcError, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, INVALID_RESPONSE,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
pub use message::{
    FailureResponse, Id, Message, MethodName, Reply, Request, RequestId, Response,
    SuccessResponse, Version, JSONRPC_VERSION,
};
