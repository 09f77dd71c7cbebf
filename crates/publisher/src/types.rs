//! Session states, session-level notifications and the crate error type.

use std::fmt;

use bfo_cbor::{CborError, Value};

use crate::transport::TransportError;

/// Lifecycle of a publisher session.
///
/// `Open` means the transport is up but the status handshake has not been
/// answered yet; callers should wait for `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing has asked for a connection yet.
    Idle,
    Connecting,
    Open,
    Connected,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
    /// Terminal: explicit disconnect, or a close with retries disabled.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which part of the session raised an [`SessionEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An inbound frame could not be decoded; it was dropped.
    Decode,
    /// Connecting or writing to the transport failed.
    Transport,
    /// A reply handler panicked.
    Handler,
}

/// Connection-scoped notifications, observable by every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The status handshake was answered.  `status` is that reply.
    Connected { status: Value },
    /// The transport closed while retries are still possible, or for good.
    Disconnected,
    Error { kind: ErrorKind, message: String },
}

/// Top-level publisher error.
#[derive(thiserror::Error, Debug)]
pub enum PublisherError {
    #[error("config: {0}")]
    Config(String),
    #[error("not connected")]
    NotConnected,
    #[error("session disconnected")]
    Disconnected,
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("codec: {0}")]
    Codec(#[from] CborError),
    /// The server answered with `ok: false`.
    #[error("rejected: {message}")]
    Rejected { message: String, response: Value },
}

impl PublisherError {
    /// Build a [`PublisherError::Rejected`] from a failed reply, using its
    /// `message` field when present.
    pub fn rejected(response: Value) -> Self {
        let message = response
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Failed")
            .to_string();
        Self::Rejected { message, response }
    }
}
