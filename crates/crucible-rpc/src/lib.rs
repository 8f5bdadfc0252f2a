//! Bidirectional JSON-RPC 2.0 over NUL-delimited streams
//!
//! Both ends of a connection are [`Peer`]s: each serves its own
//! [`MethodTable`] and can call methods on the other side over the same
//! stream. [`SocketServer`] and [`SocketClient`] manage the Unix socket
//! connections that peers run on.
//!
//! ```ignore
//! let methods = MethodTable::builder()
//!     .sync_method("addition", |params| {
//!         let a: i64 = required_param(&params, 0)?;
//!         let b: i64 = required_param(&params, 1)?;
//!         Ok(json!(a + b))
//!     })
//!     .build();
//!
//! let mut server = SocketServer::new(methods, PeerConfig::default());
//! server.listen(&path).await?;
//!
//! let mut client = SocketClient::new(MethodTable::default(), PeerConfig::default());
//! client.connect(&path).await?;
//! let sum = client.peer()?.call("addition", vec![json!(2), json!(2)]).await?;
//! ```

mod client;
pub mod config;
pub mod correlator;
pub mod dispatch;
mod endpoint;
mod error;
mod flow;
pub mod methods;
pub mod params;
mod peer;
mod server;

pub use client::SocketClient;
pub use config::PeerConfig;
pub use correlator::{Correlator, PendingCall, Subscription};
pub use dispatch::Dispatcher;
pub use endpoint::{remove_socket, socket_path, SOCKET_ENV};
pub use error::{mask_method_error, TransportError, TransportResult};
pub use methods::{Method, MethodTable, MethodTableBuilder};
pub use params::{optional_param, required_param};
pub use peer::Peer;
pub use server::SocketServer;

pub use crucible_protocol as protocol;
pub use crucible_protocol::{Reply, Request, RequestId, Response, RpcError};
