//! In-memory connector for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bfo_cbor::Value;
use futures_util::{sink, stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::transport::{Channel, ConnectTarget, Connector, Frame, TransportError};
use crate::Publisher;

pub(crate) fn map<K: Into<Value>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Value {
    pairs.into_iter().collect()
}

/// The far end of one mock connection.
pub(crate) struct MockServer {
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    pub(crate) authorization: Option<String>,
}

impl MockServer {
    /// Next message the client wrote, decoded.
    pub(crate) async fn recv(&mut self) -> Value {
        let bytes = self.outbound.recv().await.expect("client closed the channel");
        bfo_cbor::decode(&bytes).expect("client sent invalid CBOR")
    }

    pub(crate) fn reply(&self, message: Value) {
        self.send_raw(Frame::Binary(bfo_cbor::encode(&message)));
    }

    pub(crate) fn send_raw(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    /// The client dropped its end.
    pub(crate) fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }
}

struct MockState {
    refuse: bool,
    header: bool,
    attempts: AtomicUsize,
    times: Mutex<Vec<Instant>>,
    servers_tx: mpsc::UnboundedSender<MockServer>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockServer>>,
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    fn with(refuse: bool, header: bool) -> Self {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(MockState {
                refuse,
                header,
                attempts: AtomicUsize::new(0),
                times: Mutex::new(Vec::new()),
                servers_tx,
                servers_rx: tokio::sync::Mutex::new(servers_rx),
            }),
        }
    }

    /// Accepts every connection and sends credentials as a header.
    pub(crate) fn new() -> Self {
        Self::with(false, true)
    }

    /// Accepts connections but cannot send headers.
    pub(crate) fn headerless() -> Self {
        Self::with(false, false)
    }

    /// Fails every attempt.
    pub(crate) fn refusing() -> Self {
        Self::with(true, true)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.state.times.lock().clone()
    }

    /// Wait for the next successful connection.
    pub(crate) async fn accept(&self) -> MockServer {
        self.state
            .servers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }

    /// Connect `publisher` and answer its status probe.
    pub(crate) async fn connected(&self, publisher: &Publisher) -> MockServer {
        publisher.connect();
        let mut server = self.accept().await;
        let probe = server.recv().await;
        let id = probe.get("message_id").cloned().unwrap_or(Value::Null);
        server.reply(map([
            ("reply_to", id),
            ("ok", Value::Bool(true)),
            ("type", Value::from("status-response")),
        ]));
        publisher.wait_connected().await.expect("handshake failed");
        server
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Channel, TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        self.state.times.lock().push(Instant::now());
        if self.state.refuse {
            return Err(TransportError::Other("connection refused".into()));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let authorization_sent = self.state.header && target.authorization.is_some();
        let _ = self.state.servers_tx.send(MockServer {
            outbound: out_rx,
            inbound: in_tx,
            authorization: if authorization_sent {
                target.authorization.clone()
            } else {
                None
            },
        });

        let sink = sink::unfold(out_tx, |tx, bytes: Vec<u8>| async move {
            tx.send(bytes).map_err(|_| TransportError::Closed)?;
            Ok::<_, TransportError>(tx)
        });
        let stream = stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Channel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
            authorization_sent,
        })
    }
}
