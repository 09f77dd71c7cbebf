//! The public handle to a publisher session.

use std::sync::Arc;

use bfo_cbor::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use url::Url;

use crate::builder::PublisherBuilder;
use crate::config::PublisherConfig;
use crate::registry::ReplyHandler;
use crate::request::{CallbackHook, Request, RequestRouter};
use crate::session::{Command, Shared};
use crate::types::{PublisherError, SessionEvent, SessionState};

/// A cheaply clonable handle to one session.
///
/// The session task lives until the last clone is dropped.  Nothing connects
/// until [`connect`](Self::connect) or [`request`](Self::request) is called.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

struct Inner {
    url: Url,
    endpoint: Url,
    callback: Option<CallbackHook>,
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl Publisher {
    /// Start a new builder.
    pub fn builder() -> PublisherBuilder {
        PublisherBuilder::new()
    }

    /// Build with the default WebSocket connector.  Must be called inside a
    /// Tokio runtime.
    pub fn from_config(config: PublisherConfig) -> Result<Self, PublisherError> {
        PublisherBuilder::from_config(config).build()
    }

    pub(crate) fn from_parts(
        url: Url,
        endpoint: Url,
        callback: Option<CallbackHook>,
        commands: mpsc::UnboundedSender<Command>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url,
                endpoint,
                callback,
                commands,
                shared,
            }),
        }
    }

    /// The normalized service URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// The WebSocket endpoint derived from [`url`](Self::url).
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn state(&self) -> SessionState {
        self.inner.shared.state()
    }

    /// Whether the status handshake has completed on the current channel.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// The reply to the most recent status handshake.
    pub fn status(&self) -> Option<Value> {
        self.inner.shared.status.borrow().clone()
    }

    /// Session-level notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.shared.events.subscribe()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.shared.state.subscribe()
    }

    /// Start connecting if the session is still idle.  Returns immediately.
    pub fn connect(&self) {
        let _ = self.inner.commands.send(Command::Connect);
    }

    /// Wait until the session is connected.  Fails with
    /// [`PublisherError::Disconnected`] if it closes for good first.
    pub async fn wait_connected(&self) -> Result<(), PublisherError> {
        let mut rx = self.watch_state();
        let reached = *rx
            .wait_for(|s| matches!(s, SessionState::Connected | SessionState::Closed))
            .await
            .map_err(|_| PublisherError::Disconnected)?;
        match reached {
            SessionState::Connected => Ok(()),
            _ => Err(PublisherError::Disconnected),
        }
    }

    /// Send a raw message and route its replies to `handler`.  The session
    /// must already be connected; nothing is queued.  Returns the
    /// `message_id` assigned.
    pub async fn send(
        &self,
        message: Value,
        handler: impl ReplyHandler,
    ) -> Result<u64, PublisherError> {
        self.dispatch(message, Some(Box::new(handler)), false).await
    }

    /// Send a request, connecting first if needed, and return a handle for
    /// its replies.  The message must be a map with a text `type`.
    pub async fn request(&self, message: Value) -> Result<Request, PublisherError> {
        let kind = message
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| PublisherError::InvalidMessage("request needs a text `type`".into()))?;

        self.connect();
        self.wait_connected().await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let router = RequestRouter::new(
            &kind,
            events_tx,
            self.inner.callback.clone(),
            self.inner.commands.downgrade(),
        );
        let id = self.dispatch(message, Some(Box::new(router)), true).await?;
        tracing::debug!(message_id = id, kind = %kind, "request sent");
        Ok(Request::new(id, kind, events_rx))
    }

    /// Close the channel and never reconnect.  Requests still waiting
    /// resolve with [`PublisherError::Disconnected`].
    pub fn disconnect(&self) {
        let _ = self.inner.commands.send(Command::Disconnect);
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        let _ = self.inner.commands.send(Command::PendingLen(tx));
        rx.await.unwrap_or(0)
    }

    async fn dispatch(
        &self,
        message: Value,
        handler: Option<Box<dyn ReplyHandler>>,
        attach_credentials: bool,
    ) -> Result<u64, PublisherError> {
        let (ack, done) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Send {
                message,
                handler,
                attach_credentials,
                ack: Some(ack),
            })
            .map_err(|_| PublisherError::Disconnected)?;
        done.await.map_err(|_| PublisherError::Disconnected)?
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}
