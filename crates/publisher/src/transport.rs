//! Duplex byte channel the session runs over.
//!
//! The session only needs "connect, send bytes, receive frames".  The
//! [`Connector`] trait is that seam; [`WebSocketConnector`] is the real
//! implementation on top of `tokio-tungstenite`.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use url::Url;

/// Errors that can occur while connecting or exchanging frames.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid authorization header: {0}")]
    InvalidHeader(String),

    #[error("connection closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// One inbound message.  Peers normally send CBOR in binary frames but may
/// fall back to JSON text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Vec<u8>),
    Text(String),
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub endpoint: Url,
    pub authorization: Option<String>,
}

pub type FrameSink = Pin<Box<dyn Sink<Vec<u8>, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// An open channel.  Dropping both halves closes it.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
    /// Whether the credential went out of band (as a handshake header).
    /// When it did not, requests carry it in their payload instead.
    pub authorization_sent: bool,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("authorization_sent", &self.authorization_sent)
            .finish_non_exhaustive()
    }
}

/// Opens channels.  Implement this to run the session over something other
/// than a WebSocket.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, target: &ConnectTarget) -> Result<Channel, TransportError>;
}

/// Connects with `tokio-tungstenite`, sending the credential as an
/// `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, target: &ConnectTarget) -> Result<Channel, TransportError> {
        let mut request = target.endpoint.as_str().into_client_request()?;
        let mut authorization_sent = false;
        if let Some(token) = &target.authorization {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
            authorization_sent = true;
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        let (sink, stream) = ws.split();

        let sink = sink
            .with(|bytes: Vec<u8>| future::ready(Ok::<_, tungstenite::Error>(Message::Binary(bytes))))
            .sink_map_err(TransportError::from);

        // Ping/pong and close frames are answered by tungstenite itself.
        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes))),
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok(Channel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
            authorization_sent,
        })
    }
}
