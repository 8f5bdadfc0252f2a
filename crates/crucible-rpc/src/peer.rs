//! A connected JSON-RPC peer
//!
//! Either side of a connection can call methods on the other. One [`Peer`]
//! owns both directions of a byte stream:
//!
//! - a reader task splits inbound bytes into NUL-terminated frames and handles
//!   each frame concurrently (requests go to the [`Dispatcher`], responses to
//!   the [`Correlator`])
//! - a writer task drains a queue of encoded frames into the stream
//!
//! While the outbound queue is over its high-water mark the reader stops
//! taking frames, so a slow remote reader throttles how fast we accept work
//! from it.

use crate::config::PeerConfig;
use crate::correlator::{Correlator, Subscription};
use crate::dispatch::Dispatcher;
use crate::flow::FlowControl;
use crate::methods::MethodTable;
use bytes::Bytes;
use crucible_protocol::{
    encode_frame, validate, NulCodec, Reply, Request, RequestId, Response, RpcError,
};
use futures::future::join_all;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Handle to a running peer. Cheap to clone; all clones share one connection.
///
/// The connection stays up until the remote end closes it or [`Peer::end`] is
/// called, even if every handle is dropped.
#[derive(Clone)]
pub struct Peer {
    shared: Arc<Shared>,
}

struct Shared {
    dispatcher: Dispatcher,
    correlator: Correlator,
    flow: FlowControl,
    outbound: mpsc::UnboundedSender<Bytes>,
    /// Stop writing once the queue is flushed, then half-close.
    shutdown: CancellationToken,
    /// The inbound side is finished; nothing more will be read.
    closed: CancellationToken,
}

impl Peer {
    /// Start a peer over a bidirectional stream.
    pub fn new<S>(stream: S, methods: MethodTable, config: &PeerConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, methods, config)
    }

    /// Start a peer over separately owned read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W, methods: MethodTable, config: &PeerConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, frames) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            dispatcher: Dispatcher::new(methods),
            correlator: Correlator::new(config.timeout()),
            flow: FlowControl::new(config.high_water_mark),
            outbound,
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
        });

        let frames_in = FramedRead::with_capacity(reader, NulCodec::new(), config.read_buffer_size);
        tokio::spawn(read_loop(Arc::clone(&shared), frames_in));
        tokio::spawn(write_loop(Arc::clone(&shared), writer, frames));

        debug!(
            timeout_ms = config.timeout_ms,
            high_water_mark = config.high_water_mark,
            "Peer started"
        );
        Self { shared }
    }

    /// Write a message or batch and wait for whatever it produces.
    ///
    /// The payload is written as-is, even when it is not valid JSON-RPC; the
    /// local verdict on it is returned instead of a remote response:
    ///
    /// - a call resolves to the matching response, or Invalid response
    ///   (-32060) after the timeout
    /// - a notification resolves to `None`
    /// - a batch resolves to the non-`None` results in element order, or
    ///   `None` if there are none
    /// - an empty batch, a non-object, or a malformed message resolves to
    ///   Invalid request (-32600)
    ///
    /// A payload that cannot be encoded as JSON is not written at all and
    /// resolves to Parse error (-32700).
    pub async fn send<T: Serialize + ?Sized>(&self, payload: &T) -> Option<Reply> {
        let payload = match serde_json::to_value(payload) {
            Ok(payload) => payload,
            // Nothing in JSON can stand for an unencodable value, so no frame is written.
            Err(e) => {
                debug!("Outbound payload is not encodable: {}", e);
                return Some(Response::parse_failure("Malformed JSON").into());
            }
        };

        let correlator = &self.shared.correlator;
        match &payload {
            Value::Array(batch) if batch.is_empty() => {
                self.shared.write_message(&payload);
                Some(Response::invalid_request("Empty batch").into())
            }
            Value::Array(batch) => {
                let subscriptions: Vec<_> = batch.iter().map(|m| correlator.register(m)).collect();
                self.shared.write_message(&payload);
                let responses = join_all(subscriptions.into_iter().map(Subscription::resolve)).await;
                Reply::from_batch(responses.into_iter().flatten().collect())
            }
            message => {
                let subscription = correlator.register(message);
                self.shared.write_message(message);
                subscription.resolve().await.map(Reply::Single)
            }
        }
    }

    /// Call a remote method with a fresh random id.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let request = Request::call(RequestId::random(), method).with_params(params);
        match self.send(&request).await {
            Some(Reply::Single(Response::Success(success))) => Ok(success.result),
            Some(Reply::Single(Response::Failure(failure))) => Err(failure.error),
            _ => Err(RpcError::internal_error()),
        }
    }

    /// Send a notification. Nothing comes back, not even for a missing method.
    pub async fn notify(&self, method: &str, params: Vec<Value>) {
        let request = Request::notification(method).with_params(params);
        self.send(&request).await;
    }

    pub fn methods(&self) -> &MethodTable {
        self.shared.dispatcher.methods()
    }

    /// Outbound calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.correlator.pending_count()
    }

    /// True while inbound reads are held back by outbound backpressure.
    pub fn is_paused(&self) -> bool {
        self.shared.flow.is_paused()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Wait until the connection has closed.
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    /// Flush queued frames, half-close, and wait for the remote to close.
    pub async fn end(&self) {
        self.shared.shutdown.cancel();
        self.closed().await
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("methods", self.methods())
            .field("correlator", &self.shared.correlator)
            .field("queued_bytes", &self.shared.flow.queued_bytes())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Shared {
    /// Encode and queue one message or batch.
    fn write_message<T: Serialize + ?Sized>(&self, message: &T) {
        match encode_frame(message) {
            Ok(frame) => self.write_frame(frame),
            Err(e) => warn!("Failed to encode outbound message: {}", e),
        }
    }

    /// Queue a frame for the writer task. Crossing the high-water mark pauses
    /// inbound reads inside `FlowControl::queued`.
    fn write_frame(&self, frame: Bytes) {
        let len = frame.len();
        self.flow.queued(len);
        if self.outbound.send(frame).is_err() {
            debug!(bytes = len, "Writer stopped, dropping outbound frame");
            self.flow.drained(len);
        }
    }

    async fn receive_payload(&self, payload: Bytes) {
        let message: Value = match serde_json::from_slice(&payload) {
            Ok(message) => message,
            Err(e) => {
                debug!("Malformed inbound payload: {}", e);
                self.write_message(&Response::parse_failure("Malformed JSON"));
                return;
            }
        };

        if let Some(reply) = self.receive_message(message).await {
            self.write_message(&reply);
        }
    }

    async fn receive_message(&self, message: Value) -> Option<Reply> {
        match message {
            Value::Array(batch) if batch.is_empty() => {
                Some(Response::invalid_request("Empty batch").into())
            }
            Value::Array(batch) => {
                let responses = join_all(batch.into_iter().map(|m| self.handle_message(m))).await;
                Reply::from_batch(responses.into_iter().flatten().collect())
            }
            message => self.handle_message(message).await.map(Reply::Single),
        }
    }

    /// Route one batch element or single message.
    async fn handle_message(&self, message: Value) -> Option<Response> {
        let Some(fields) = validate::as_message(&message) else {
            return Some(Response::invalid_request("Uncompliant object"));
        };

        if validate::is_request(fields) {
            return match Request::deserialize(&message) {
                Ok(request) => self.dispatcher.dispatch(request).await,
                Err(e) => {
                    debug!("Request members have invalid types: {}", e);
                    Some(Response::invalid_request("Malformed JSON-RPC"))
                }
            };
        }

        if !validate::is_response(fields) {
            return Some(Response::invalid_request("Malformed JSON-RPC"));
        }

        match Response::deserialize(&message) {
            Ok(response) => self.correlator.publish(response),
            Err(e) => debug!("Dropping undecodable response: {}", e),
        }
        None
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut frames: FramedRead<R, NulCodec>)
where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = shared.flow.resumed() => {}
            _ = shared.closed.cancelled() => break,
        }

        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = shared.closed.cancelled() => break,
        };

        match frame {
            Some(Ok(payload)) => {
                trace!(bytes = payload.len(), "Inbound frame");
                let shared = Arc::clone(&shared);
                tokio::spawn(async move { shared.receive_payload(payload).await });
            }
            Some(Err(e)) => {
                warn!("Read error: {}", e);
                break;
            }
            None => {
                debug!("Remote closed the connection");
                break;
            }
        }
    }

    shared.closed.cancel();
    shared.shutdown.cancel();
}

async fn write_loop<W>(shared: Arc<Shared>, mut writer: W, mut frames: mpsc::UnboundedReceiver<Bytes>)
where
    W: AsyncWrite + Unpin,
{
    let mut healthy = true;

    while healthy {
        let frame = tokio::select! {
            biased;
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = shared.shutdown.cancelled() => break,
        };
        healthy = write_frame(&mut writer, &frame).await;
        shared.flow.drained(frame.len());
    }

    // Flush what was queued before shutdown; later writes are refused.
    frames.close();
    while let Some(frame) = frames.recv().await {
        if healthy {
            healthy = write_frame(&mut writer, &frame).await;
        }
        shared.flow.drained(frame.len());
    }

    if healthy {
        if let Err(e) = writer.shutdown().await {
            debug!("Shutdown error: {}", e);
        }
    } else {
        shared.closed.cancel();
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> bool {
    let result = async {
        writer.write_all(frame).await?;
        writer.flush().await
    }
    .await;

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Write error: {}", e);
            false
        }
    }
}
