//! Listening connection manager
//!
//! Binds a Unix socket and turns every accepted connection into a [`Peer`]
//! sharing one method table. Peers are tracked until their connection closes,
//! so the server can push calls to any connected client.

use crate::config::PeerConfig;
use crate::endpoint;
use crate::error::TransportResult;
use crate::methods::MethodTable;
use crate::peer::Peer;
use dashmap::DashMap;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct SocketServer {
    methods: MethodTable,
    config: PeerConfig,
    peers: Arc<DashMap<u64, Peer>>,
    listening: Option<Listening>,
}

#[derive(Debug)]
struct Listening {
    path: PathBuf,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

impl SocketServer {
    pub fn new(methods: MethodTable, config: PeerConfig) -> Self {
        Self {
            methods,
            config,
            peers: Arc::new(DashMap::new()),
            listening: None,
        }
    }

    /// Listen at the default socket path
    pub async fn listen_default(&mut self) -> TransportResult<()> {
        let path = endpoint::socket_path();
        self.listen(&path).await
    }

    /// Bind `path` and start accepting. Does nothing if already listening.
    ///
    /// A stale socket file at `path` is replaced and missing parent
    /// directories are created.
    pub async fn listen(&mut self, path: impl AsRef<Path>) -> TransportResult<()> {
        let path = path.as_ref();
        if self.listening.is_some() {
            debug!(?path, "Already listening");
            return Ok(());
        }

        endpoint::prepare_socket(path)?;
        let listener = UnixListener::bind(path)?;
        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            listener,
            self.methods.clone(),
            self.config.clone(),
            Arc::clone(&self.peers),
            shutdown.clone(),
        ));

        info!("Listening on {:?}", path);
        self.listening = Some(Listening {
            path: path.to_path_buf(),
            shutdown,
            accept_task,
        });
        Ok(())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.listening.as_ref().map(|l| l.path.as_path())
    }

    /// Snapshot of the currently connected peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Stop accepting, end every connection, wait for them to close, and
    /// remove the socket file. Does nothing if not listening.
    pub async fn close(&mut self) {
        let Some(listening) = self.listening.take() else {
            return;
        };

        listening.shutdown.cancel();
        if let Err(e) = listening.accept_task.await {
            warn!("Accept task panicked: {}", e);
        }

        let peers = self.peers();
        debug!(peers = peers.len(), "Ending connections");
        join_all(peers.iter().map(Peer::end)).await;
        self.peers.clear();

        endpoint::remove_socket(&listening.path);
        info!("Stopped listening on {:?}", listening.path);
    }
}

async fn accept_loop(
    listener: UnixListener,
    methods: MethodTable,
    config: PeerConfig,
    peers: Arc<DashMap<u64, Peer>>,
    shutdown: CancellationToken,
) {
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let id = next_id;
                        next_id += 1;
                        let (read, write) = stream.into_split();
                        let peer = Peer::from_parts(read, write, methods.clone(), &config);
                        peers.insert(id, peer.clone());
                        debug!(peer = id, "Accepted connection");

                        let peers = Arc::clone(&peers);
                        tokio::spawn(async move {
                            peer.closed().await;
                            peers.remove(&id);
                            debug!(peer = id, "Connection closed");
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = shutdown.cancelled() => {
                debug!("Accept loop shutting down");
                break;
            }
        }
    }
}
