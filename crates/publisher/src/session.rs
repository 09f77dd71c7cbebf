//! Connection manager: a single task that owns the channel, the backoff,
//! the pending-request registry and the message id counter.
//!
//! Everything that touches session state (public calls, inbound frames,
//! connect results, retry timers) is funnelled through one `select!` loop,
//! so handlers never run concurrently and frames are processed strictly in
//! arrival order.

use std::pin::Pin;
use std::sync::Arc;

use bfo_cbor::{encode_into, Value};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Sleep;

use crate::backoff::Backoff;
use crate::registry::{Dispatch, PendingRequests, ReplyHandler};
use crate::transport::{
    Channel, ConnectTarget, Connector, Frame, FrameSink, FrameStream, TransportError,
};
use crate::types::{ErrorKind, PublisherError, SessionEvent, SessionState};

/// Ids stay within the range a JSON peer can represent exactly.
const MAX_MESSAGE_ID: u64 = (1 << 53) - 1;

const EVENT_CAPACITY: usize = 64;

/// Requests from [`Publisher`](crate::Publisher) handles to the session task.
pub(crate) enum Command {
    /// Start connecting if nothing has yet.
    Connect,
    Send {
        message: Value,
        handler: Option<Box<dyn ReplyHandler>>,
        /// Add (or strip) the in-band `authorization` field.
        attach_credentials: bool,
        ack: Option<oneshot::Sender<Result<u64, PublisherError>>>,
    },
    Disconnect,
    #[cfg(test)]
    PendingLen(oneshot::Sender<usize>),
}

/// State the session publishes to handles.
pub(crate) struct Shared {
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) status: watch::Sender<Option<Value>>,
    pub(crate) events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (status, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            status,
            events,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(from = %prev, to = %next, "session state");
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) {
        self.emit(SessionEvent::Error {
            kind,
            message: message.into(),
        });
    }

    /// The status handshake was answered.
    fn mark_connected(&self, status: Value) {
        self.status.send_replace(Some(status.clone()));
        self.set_state(SessionState::Connected);
        tracing::info!("publisher session connected");
        self.emit(SessionEvent::Connected { status });
    }
}

struct Link {
    sink: FrameSink,
    stream: FrameStream,
    authorization_sent: bool,
}

enum Event {
    Command(Command),
    /// Every handle is gone.
    Shutdown,
    Opened(Result<Channel, TransportError>),
    Frame(Option<Result<Frame, TransportError>>),
    Retry,
}

pub(crate) struct SessionOptions {
    pub(crate) target: ConnectTarget,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) backoff: Backoff,
    pub(crate) debug_wire: bool,
}

pub(crate) struct Session {
    target: ConnectTarget,
    connector: Arc<dyn Connector>,
    backoff: Backoff,
    debug_wire: bool,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedReceiver<Command>,

    pending: PendingRequests,
    last_id: u64,
    /// The status request on the current channel, until answered.
    handshake_id: Option<u64>,
    link: Option<Link>,
    connecting: Option<BoxFuture<'static, Result<Channel, TransportError>>>,
    retry: Option<Pin<Box<Sleep>>>,
    /// Explicit disconnect happened; nothing reconnects any more.
    disabled: bool,
}

impl Session {
    pub(crate) fn new(
        options: SessionOptions,
        shared: Arc<Shared>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            target: options.target,
            connector: options.connector,
            backoff: options.backoff,
            debug_wire: options.debug_wire,
            shared,
            commands,
            pending: PendingRequests::new(),
            last_id: 0,
            handshake_id: None,
            link: None,
            connecting: None,
            retry: None,
            disabled: false,
        }
    }

    /// Run until every [`Publisher`](crate::Publisher) handle is dropped.
    pub(crate) async fn run(mut self) {
        loop {
            let event = tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => Event::Command(cmd),
                    None => Event::Shutdown,
                },
                opened = connect_result(&mut self.connecting) => Event::Opened(opened),
                frame = next_frame(&mut self.link) => Event::Frame(frame),
                () = retry_due(&mut self.retry) => Event::Retry,
            };

            match event {
                Event::Command(cmd) => self.on_command(cmd).await,
                Event::Shutdown => {
                    self.shutdown().await;
                    return;
                }
                Event::Opened(Ok(channel)) => self.on_open(channel).await,
                Event::Opened(Err(e)) => {
                    self.connecting = None;
                    tracing::warn!(endpoint = %self.target.endpoint, error = %e, "connect failed");
                    self.shared.error(ErrorKind::Transport, e.to_string());
                    self.on_close();
                }
                Event::Frame(Some(Ok(frame))) => self.on_frame(frame),
                Event::Frame(Some(Err(e))) => {
                    tracing::warn!(error = %e, "transport error");
                    self.shared.error(ErrorKind::Transport, e.to_string());
                    self.on_close();
                }
                Event::Frame(None) => {
                    tracing::info!(endpoint = %self.target.endpoint, "publisher closed connection");
                    self.on_close();
                }
                Event::Retry => {
                    self.retry = None;
                    self.start_connect();
                }
            }
        }
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => {
                if self.shared.state() == SessionState::Idle && !self.disabled {
                    self.start_connect();
                }
            }
            Command::Send {
                message,
                handler,
                attach_credentials,
                ack,
            } => {
                let result = if self.shared.state() == SessionState::Connected {
                    let mut message = message;
                    if attach_credentials {
                        self.apply_credentials(&mut message);
                    }
                    self.transmit(message, handler).await
                } else {
                    Err(PublisherError::NotConnected)
                };
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                } else if let Err(e) = result {
                    tracing::warn!(error = %e, "dropped outbound message");
                }
            }
            Command::Disconnect => self.disconnect().await,
            #[cfg(test)]
            Command::PendingLen(reply) => {
                let _ = reply.send(self.pending.len());
            }
        }
    }

    fn start_connect(&mut self) {
        tracing::info!(endpoint = %self.target.endpoint, "connecting to publisher");
        self.shared.set_state(SessionState::Connecting);
        let connector = Arc::clone(&self.connector);
        let target = self.target.clone();
        self.connecting = Some(Box::pin(async move { connector.connect(&target).await }));
    }

    async fn on_open(&mut self, channel: Channel) {
        self.connecting = None;
        self.link = Some(Link {
            sink: channel.sink,
            stream: channel.stream,
            authorization_sent: channel.authorization_sent,
        });
        self.backoff.reset();
        self.shared.set_state(SessionState::Open);
        tracing::debug!(
            authorization_sent = channel.authorization_sent,
            "transport open, sending status probe"
        );

        let shared = Arc::clone(&self.shared);
        let probe = move |reply: Value| {
            shared.mark_connected(reply);
            true
        };
        let status: Value = [("type", "status")].into_iter().collect();
        match self.transmit(status, Some(Box::new(probe))).await {
            Ok(id) => self.handshake_id = Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "status probe failed");
                self.shared.error(ErrorKind::Transport, e.to_string());
                self.on_close();
            }
        }
    }

    /// The transport went away, or never came up.
    fn on_close(&mut self) {
        self.link = None;
        self.connecting = None;
        // An unanswered handshake can never be matched on a later channel.
        if let Some(id) = self.handshake_id.take() {
            self.pending.remove(id);
        }
        if self.disabled {
            return;
        }
        match self.backoff.next_delay() {
            Some(delay) => {
                tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting");
                self.shared.set_state(SessionState::Reconnecting);
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
            }
            None => {
                tracing::info!("reconnection disabled, session closed");
                self.shared.set_state(SessionState::Closed);
                self.pending.clear();
            }
        }
        self.shared.emit(SessionEvent::Disconnected);
    }

    async fn disconnect(&mut self) {
        tracing::info!("disconnect requested");
        self.disabled = true;
        self.backoff.disable();
        self.connecting = None;
        self.retry = None;
        self.handshake_id = None;
        self.close_link().await;
        self.pending.clear();
        self.shared.set_state(SessionState::Closed);
    }

    async fn shutdown(&mut self) {
        self.disabled = true;
        self.close_link().await;
        self.pending.clear();
        self.shared.set_state(SessionState::Closed);
    }

    async fn close_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.sink.close().await {
                tracing::debug!(error = %e, "error closing transport");
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) {
        let decoded = match frame {
            Frame::Binary(bytes) => bfo_cbor::decode(&bytes).map_err(|e| e.to_string()),
            Frame::Text(text) => Value::from_json_str(&text).map_err(|e| e.to_string()),
        };
        let mut message = match decoded {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                self.shared.error(ErrorKind::Decode, e);
                return;
            }
        };
        if self.debug_wire {
            tracing::debug!(direction = "rx", message = %message.to_json(), "wire");
        }

        let Some(id) = message.remove("reply_to").as_ref().and_then(Value::as_u64) else {
            tracing::trace!("frame without reply_to");
            return;
        };
        match self.pending.dispatch(id, message) {
            Dispatch::Unmatched => tracing::trace!(reply_to = id, "unmatched reply"),
            Dispatch::Completed if self.handshake_id == Some(id) => self.handshake_id = None,
            Dispatch::Retained | Dispatch::Completed => {}
            Dispatch::Panicked(msg) => {
                tracing::error!(reply_to = id, panic = %msg, "reply handler panicked");
                self.shared.error(ErrorKind::Handler, msg);
            }
        }
    }

    /// In-band credentials: add `authorization` when the header could not
    /// carry it, and strip a caller-supplied copy of the header credential.
    fn apply_credentials(&self, message: &mut Value) {
        let (Some(token), Some(link)) = (&self.target.authorization, &self.link) else {
            return;
        };
        if link.authorization_sent {
            if message.get("authorization").and_then(Value::as_str) == Some(token.as_str()) {
                message.remove("authorization");
            }
        } else if message.get("authorization").is_none() {
            message.insert("authorization", token.as_str());
        }
    }

    /// Stamp a `message_id`, register the handler and write the frame.
    async fn transmit(
        &mut self,
        mut message: Value,
        handler: Option<Box<dyn ReplyHandler>>,
    ) -> Result<u64, PublisherError> {
        if self.link.is_none() {
            return Err(PublisherError::NotConnected);
        }
        if !message.is_map() {
            return Err(PublisherError::InvalidMessage(
                "outbound message must be a map".into(),
            ));
        }

        self.last_id = if self.last_id >= MAX_MESSAGE_ID {
            1
        } else {
            self.last_id + 1
        };
        let id = self.last_id;
        message.insert("message_id", id);
        if self.debug_wire {
            tracing::debug!(direction = "tx", message = %message.to_json(), "wire");
        }

        let mut bytes = Vec::with_capacity(256);
        encode_into(&message, &mut bytes)?;

        if let Some(handler) = handler {
            self.pending.insert_boxed(id, handler);
        }
        let Some(link) = self.link.as_mut() else {
            return Err(PublisherError::NotConnected);
        };
        if let Err(e) = link.sink.send(bytes).await {
            self.pending.remove(id);
            return Err(e.into());
        }
        Ok(id)
    }
}

async fn connect_result(
    connecting: &mut Option<BoxFuture<'static, Result<Channel, TransportError>>>,
) -> Result<Channel, TransportError> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(link: &mut Option<Link>) -> Option<Result<Frame, TransportError>> {
    match link {
        Some(link) => link.stream.next().await,
        None => std::future::pending().await,
    }
}

async fn retry_due(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}
