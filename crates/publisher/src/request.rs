//! Request façade: one outgoing message and the stream of replies it gets.
//!
//! A request ends with a `<type>-response` carrying a truthy `complete`
//! flag, or with any reply whose `ok` is falsy.  Everything before that
//! (log lines, progress updates) is surfaced as a [`RequestEvent`].

use std::sync::Arc;

use bfo_cbor::value::truthy;
use bfo_cbor::Value;
use tokio::sync::mpsc;

use crate::registry::ReplyHandler;
use crate::session::Command;
use crate::types::PublisherError;

/// Hook for server `callback` messages.  Receives the `callbacks` field and
/// may return a replacement; `None` (or a falsy value) sends the original
/// back unchanged.
pub type CallbackHook = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Something that happened to an in-flight request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    /// The `log` field of a `log` message.
    Log(Value),
    /// A partial response.
    Update(Value),
    /// The final response.
    Complete(Value),
    /// The server answered with `ok: false`.
    Failed(Value),
}

impl RequestEvent {
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_))
    }
}

/// Build a request envelope `{type, ..params}`.  `params` must be a map or
/// null.
pub fn envelope(kind: &str, params: Value) -> Result<Value, PublisherError> {
    let mut message: Value = [("type", kind)].into_iter().collect();
    match params {
        Value::Null | Value::Undefined => {}
        Value::Map(entries) => {
            for (key, value) in entries {
                match key {
                    Value::Text(key) if key == "type" || key == "message_id" => {}
                    Value::Text(key) => {
                        message.insert(&key, value);
                    }
                    other => {
                        return Err(PublisherError::InvalidMessage(format!(
                            "parameter keys must be text, got {other:?}"
                        )))
                    }
                }
            }
        }
        other => {
            return Err(PublisherError::InvalidMessage(format!(
                "parameters must be a map, got {other:?}"
            )))
        }
    }
    Ok(message)
}

/// Handle to an in-flight request.
#[derive(Debug)]
pub struct Request {
    id: u64,
    kind: String,
    events: mpsc::UnboundedReceiver<RequestEvent>,
}

impl Request {
    pub(crate) fn new(id: u64, kind: String, events: mpsc::UnboundedReceiver<RequestEvent>) -> Self {
        Self { id, kind, events }
    }

    /// The `message_id` the request went out with.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request `type`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Next event, or `None` once the request is finished or the session
    /// dropped it.
    pub async fn next_event(&mut self) -> Option<RequestEvent> {
        self.events.recv().await
    }

    /// Wait for the final response, discarding logs and updates.
    pub async fn response(mut self) -> Result<Value, PublisherError> {
        while let Some(event) = self.events.recv().await {
            match event {
                RequestEvent::Complete(response) => return Ok(response),
                RequestEvent::Failed(response) => return Err(PublisherError::rejected(response)),
                RequestEvent::Log(_) | RequestEvent::Update(_) => {}
            }
        }
        Err(PublisherError::Disconnected)
    }
}

/// Routes replies for one request into its event channel.
pub(crate) struct RequestRouter {
    response_type: String,
    events: mpsc::UnboundedSender<RequestEvent>,
    callback: Option<CallbackHook>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl RequestRouter {
    pub(crate) fn new(
        kind: &str,
        events: mpsc::UnboundedSender<RequestEvent>,
        callback: Option<CallbackHook>,
        commands: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            response_type: format!("{kind}-response"),
            events,
            callback,
            commands,
        }
    }

    fn emit(&self, event: RequestEvent) {
        // The caller may have dropped the handle; replies are still consumed.
        let _ = self.events.send(event);
    }

    fn answer_callback(&self, reply: &Value) {
        let callbacks = reply.get("callbacks").cloned().unwrap_or(Value::Null);
        let answer = self
            .callback
            .as_ref()
            .and_then(|hook| hook(&callbacks))
            .filter(Value::is_truthy)
            .unwrap_or(callbacks);
        let message: Value = [
            ("type", Value::from("callback-response")),
            (
                "callback_id",
                reply.get("callback_id").cloned().unwrap_or(Value::Null),
            ),
            ("callbacks", answer),
        ]
        .into_iter()
        .collect();

        match self.commands.upgrade() {
            Some(commands) => {
                let _ = commands.send(Command::Send {
                    message,
                    handler: None,
                    attach_credentials: false,
                    ack: None,
                });
            }
            None => tracing::debug!("session gone, callback-response not sent"),
        }
    }
}

impl ReplyHandler for RequestRouter {
    fn on_reply(&mut self, reply: Value) -> bool {
        if !truthy(reply.get("ok")) {
            self.emit(RequestEvent::Failed(reply));
            return true;
        }
        match reply.get("type").and_then(Value::as_str) {
            Some("log") => {
                let log = reply.get("log").cloned().unwrap_or(Value::Null);
                self.emit(RequestEvent::Log(log));
                false
            }
            Some(t) if t == self.response_type => {
                if truthy(reply.get("complete")) {
                    self.emit(RequestEvent::Complete(reply));
                    true
                } else {
                    self.emit(RequestEvent::Update(reply));
                    false
                }
            }
            Some("callback") => {
                self.answer_callback(&reply);
                false
            }
            other => {
                tracing::trace!(reply_type = ?other, "ignoring reply");
                false
            }
        }
    }
}
