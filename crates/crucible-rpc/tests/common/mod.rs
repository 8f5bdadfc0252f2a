//! Shared fixtures for peer integration tests

#![allow(dead_code)]

use crucible_rpc::protocol::NulCodec;
use crucible_rpc::{required_param, MethodTable, Peer, PeerConfig, SocketClient, SocketServer};
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

pub const CALL_TIMEOUT: Duration = Duration::from_millis(300);

/// Route peer logs to the test harness; `RUST_LOG=crucible_rpc=debug` shows them.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `addition`, `timeout` (answers well after [`CALL_TIMEOUT`]) and `throws`,
/// plus `record`, which forwards its params to the returned receiver.
pub fn methods() -> (MethodTable, mpsc::UnboundedReceiver<Vec<Value>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let table = MethodTable::builder()
        .sync_method("addition", |params| {
            let a: i64 = required_param(&params, 0)?;
            let b: i64 = required_param(&params, 1)?;
            Ok(json!(a + b))
        })
        .method("timeout", |_params: Vec<Value>| async move {
            tokio::time::sleep(CALL_TIMEOUT * 5).await;
            anyhow::Ok(Value::Null)
        })
        .sync_method("throws", |_| anyhow::bail!("database password is hunter2"))
        .sync_method("record", move |params| {
            let _ = tx.send(params);
            Ok(Value::Null)
        })
        .build();
    (table, rx)
}

pub fn config() -> PeerConfig {
    PeerConfig::default().with_timeout(CALL_TIMEOUT)
}

/// A listening server and a connected client in a private temp directory.
pub struct TestPair {
    _temp_dir: TempDir,
    pub socket_path: PathBuf,
    pub server: SocketServer,
    pub client: SocketClient,
    pub server_calls: mpsc::UnboundedReceiver<Vec<Value>>,
    pub client_calls: mpsc::UnboundedReceiver<Vec<Value>>,
}

impl TestPair {
    pub async fn start() -> anyhow::Result<Self> {
        init_test_logging();
        let temp_dir = tempfile::tempdir()?;
        let socket_path = temp_dir.path().join("rpc.sock");

        let (server_methods, server_calls) = methods();
        let mut server = SocketServer::new(server_methods, config());
        server.listen(&socket_path).await?;

        let (client_methods, client_calls) = methods();
        let mut client = SocketClient::new(client_methods, config());
        client.connect(&socket_path).await?;

        Ok(Self {
            _temp_dir: temp_dir,
            socket_path,
            server,
            client,
            server_calls,
            client_calls,
        })
    }

    pub fn client_peer(&self) -> Peer {
        self.client.peer().expect("client connected").clone()
    }

    /// The server-side peer of the client connection, once accepted.
    pub async fn server_peer(&self) -> Peer {
        for _ in 0..100 {
            if let Some(peer) = self.server.peers().into_iter().next() {
                return peer;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("server never accepted the client");
    }

    pub async fn shutdown(mut self) {
        self.client.end().await;
        self.server.close().await;
    }
}

/// The far end of a [`Peer`] driven by hand: raw bytes in, decoded frames out.
pub struct RawEnd {
    pub frames: FramedRead<ReadHalf<DuplexStream>, NulCodec>,
    pub writer: WriteHalf<DuplexStream>,
}

impl RawEnd {
    pub async fn write(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("raw write");
    }

    /// Write one JSON value followed by the delimiter.
    pub async fn write_json(&mut self, value: &Value) {
        let mut bytes = serde_json::to_vec(value).unwrap();
        bytes.push(0);
        self.write(&bytes).await;
    }

    pub async fn next_frame(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.frames.next())
            .await
            .expect("frame before timeout")
            .expect("stream open")
            .expect("frame decodes");
        serde_json::from_slice(&frame).expect("frame is JSON")
    }

    /// True if nothing arrives within `wait`.
    pub async fn is_silent(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.frames.next()).await.is_err()
    }

    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// A peer serving [`methods`] whose remote side is a [`RawEnd`].
pub fn raw_pair(config: PeerConfig, buffer: usize) -> (Peer, RawEnd) {
    init_test_logging();
    let (local, remote) = tokio::io::duplex(buffer);
    let (table, _) = methods();
    let peer = Peer::new(local, table, &config);
    let (read, write) = tokio::io::split(remote);
    (
        peer,
        RawEnd {
            frames: FramedRead::new(read, NulCodec::new()),
            writer: write,
        },
    )
}

/// Assert `response` is an error with `code` and, if given, `data`.
pub fn assert_error(response: &Value, code: i64, data: Option<&str>) {
    assert_eq!(response["error"]["code"], json!(code), "in {}", response);
    if let Some(data) = data {
        assert_eq!(response["error"]["data"], json!(data), "in {}", response);
    }
}
