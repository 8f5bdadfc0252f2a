//! Outgoing connection manager

use crate::config::PeerConfig;
use crate::error::{TransportError, TransportResult};
use crate::methods::MethodTable;
use crate::peer::Peer;
use std::path::Path;
use tokio::net::UnixStream;
use tracing::{debug, info};

/// Owns at most one connection to a [`crate::SocketServer`].
///
/// The client exposes its own methods to the server just as the server
/// exposes its methods to the client.
#[derive(Debug)]
pub struct SocketClient {
    methods: MethodTable,
    config: PeerConfig,
    peer: Option<Peer>,
}

impl SocketClient {
    pub fn new(methods: MethodTable, config: PeerConfig) -> Self {
        Self {
            methods,
            config,
            peer: None,
        }
    }

    /// Connect to the server at the default socket path
    pub async fn connect_default(&mut self) -> TransportResult<()> {
        let path = crate::endpoint::socket_path();
        self.connect(&path).await
    }

    /// Connect to a server socket. Does nothing if already connected.
    pub async fn connect(&mut self, path: impl AsRef<Path>) -> TransportResult<()> {
        let path = path.as_ref();
        if self.peer.is_some() {
            debug!(?path, "Already connected");
            return Ok(());
        }

        let stream = UnixStream::connect(path).await?;
        let (read, write) = stream.into_split();
        self.peer = Some(Peer::from_parts(read, write, self.methods.clone(), &self.config));
        info!("Connected to {:?}", path);
        Ok(())
    }

    /// The live connection, if any.
    pub fn peer(&self) -> TransportResult<&Peer> {
        self.peer.as_ref().ok_or(TransportError::NotConnected)
    }

    pub fn is_connected(&self) -> bool {
        self.peer.as_ref().is_some_and(|peer| !peer.is_closed())
    }

    /// Close the connection and wait for the server to acknowledge. Does
    /// nothing if not connected.
    pub async fn end(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.end().await;
            info!("Disconnected");
        }
    }
}
