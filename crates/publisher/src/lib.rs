//! `bfo-publisher`: client session for the BFO Publisher service.
//!
//! The service speaks CBOR over a WebSocket.  Every outbound frame is a map
//! with a `type` and a session-assigned `message_id`; every reply carries
//! `reply_to` naming the request it answers.  Long-running requests are
//! answered by several frames (log lines, progress updates) before the final
//! one.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  Command (mpsc)   ┌──────────────────────────────┐
//! │  Publisher   │ ────────────────▶ │  Session task                │
//! │  (handle)    │                   │   backoff · registry · ids   │
//! │              │ ◀──── watch ───── │   select! over commands,     │
//! │  Request ◀───┼── RequestEvent ── │   connect, frames, retry     │
//! └──────────────┘   broadcast       └──────────────┬───────────────┘
//!                    SessionEvent                   │ Connector
//!                                                   ▼
//!                                          WebSocket (CBOR frames)
//! ```
//!
//! # Connection flow
//!
//! 1. The first `connect()` or `request()` opens the channel (lazy).
//! 2. On open the backoff resets and `{type: "status"}` is sent.
//! 3. The reply to that probe marks the session connected and is kept as
//!    [`Publisher::status`].
//! 4. On close the session waits out the backoff (500ms, 2s, 8s, ... capped
//!    at `max_backoff`) and reconnects, unless `disconnect()` was called.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), bfo_publisher::PublisherError> {
//! use bfo_publisher::{envelope, Publisher, PublisherConfig, RequestEvent, Value};
//!
//! let publisher = Publisher::from_config(PublisherConfig::new("https://bfo.example.com/"))?;
//! let params: Value = [("put", Value::Array(vec![]))].into_iter().collect();
//! let mut request = publisher.request(envelope("convert", params)?).await?;
//! while let Some(event) = request.next_event().await {
//!     match event {
//!         RequestEvent::Log(line) => println!("log: {}", line.to_json()),
//!         RequestEvent::Complete(reply) => println!("{}", reply.to_json()),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod builder;
pub mod config;
pub mod publisher;
pub mod registry;
pub mod request;
pub mod transport;
pub mod types;

mod session;

#[cfg(test)]
mod testing;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use backoff::Backoff;
pub use builder::PublisherBuilder;
pub use config::PublisherConfig;
pub use publisher::Publisher;
pub use registry::{Dispatch, PendingRequests, ReplyHandler};
pub use request::{envelope, CallbackHook, Request, RequestEvent};
pub use transport::{Channel, ConnectTarget, Connector, Frame, TransportError, WebSocketConnector};
pub use types::{ErrorKind, PublisherError, SessionEvent, SessionState};

pub use bfo_cbor::Value;
